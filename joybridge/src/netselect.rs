//! Interactive network interface selection.
//!
//! Used when no interface name is given on the command line or in the
//! configuration file.

use crate::error::BridgeError;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::info;

/// Kernel directory listing the network interfaces.
pub const SYS_CLASS_NET: &str = "/sys/class/net";

/// Interface names found in `dir`, sorted, loopback excluded.
pub fn list_interfaces(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name != "lo" {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Print `interfaces` to `output` and read the chosen index from `input`.
///
/// Invalid answers are asked again; end of input gives up.
pub fn select_interface<R: BufRead, W: Write>(
    interfaces: &[String],
    mut input: R,
    mut output: W,
) -> Result<String, BridgeError> {
    if interfaces.is_empty() {
        return Err(BridgeError::NoInterface);
    }

    writeln!(output, "Available network interfaces:")?;
    for (idx, name) in interfaces.iter().enumerate() {
        writeln!(output, "  {idx}: {name}")?;
    }

    let mut line = String::new();
    loop {
        write!(output, "Select the network interface [0-{}]: ", interfaces.len() - 1)?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(BridgeError::NoInterface);
        }
        match line.trim().parse::<usize>() {
            Ok(idx) if idx < interfaces.len() => {
                info!("Selected network interface {}", interfaces[idx]);
                return Ok(interfaces[idx].clone());
            }
            _ => writeln!(output, "Invalid selection '{}'", line.trim())?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lists_sorted_without_loopback() {
        let dir = TempDir::new().unwrap();
        for name in ["eth1", "lo", "enp3s0", "eth0"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        assert_eq!(
            list_interfaces(dir.path()).unwrap(),
            names(&["enp3s0", "eth0", "eth1"])
        );
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(list_interfaces(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn valid_index_selects() {
        let mut out = Vec::new();
        let chosen = select_interface(&names(&["eth0", "eth1"]), Cursor::new("1\n"), &mut out).unwrap();
        assert_eq!(chosen, "eth1");
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  0: eth0"));
        assert!(text.contains("[0-1]"));
    }

    #[test]
    fn invalid_answers_are_asked_again() {
        let mut out = Vec::new();
        let chosen =
            select_interface(&names(&["eth0"]), Cursor::new("x\n7\n 0 \n"), &mut out).unwrap();
        assert_eq!(chosen, "eth0");
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Invalid selection").count(), 2);
    }

    #[test]
    fn end_of_input_gives_up() {
        let result = select_interface(&names(&["eth0"]), Cursor::new(""), Vec::new());
        assert!(matches!(result, Err(BridgeError::NoInterface)));
    }

    #[test]
    fn no_interfaces() {
        let result = select_interface(&[], Cursor::new("0\n"), Vec::new());
        assert!(matches!(result, Err(BridgeError::NoInterface)));
    }
}

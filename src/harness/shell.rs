use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Result};

pub enum Command {
  Step(u32), // Step N cycles
  Quit,
  Continue,
  States,
  Examine { addr: u32, len: usize },
}

static mut EDITOR: Option<DefaultEditor> = None;

fn get_editor() -> &'static mut DefaultEditor {
  unsafe {
    if EDITOR.is_none() {
      EDITOR = Some(DefaultEditor::new().expect("Failed to create readline editor"));
    }
    EDITOR.as_mut().unwrap()
  }
}

fn parse_addr(text: &str) -> std::result::Result<u32, std::num::ParseIntError> {
  if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
    u32::from_str_radix(hex, 16)
  } else {
    text.parse::<u32>()
  }
}

pub fn read_command() -> Result<Command> {
  let editor = get_editor();

  loop {
    match editor.readline("(urvsim) ") {
      Ok(line) => {
        let trimmed = line.trim();

        // Add to history if not empty
        if !trimmed.is_empty() {
          let _ = editor.add_history_entry(trimmed);
        }

        // Empty input: step once
        if trimmed.is_empty() {
          return Ok(Command::Step(1));
        }

        // si command: step N cycles
        if trimmed.starts_with("si") {
          let num_str = trimmed[2..].trim();

          if num_str.is_empty() {
            eprintln!("Error: 'si' requires a number, e.g., 'si 100'");
            continue;
          }

          return match num_str.parse::<u32>() {
            Ok(n) if n > 0 => Ok(Command::Step(n)),
            Ok(_) => {
              eprintln!("Error: step count must be greater than 0");
              continue;
            }
            Err(e) => {
              eprintln!("Error: invalid number '{}': {}", num_str, e);
              continue;
            }
          };
        }

        // x command: examine memory, 'x ADDR [LEN]'
        if trimmed.starts_with('x') && trimmed[1..].starts_with(char::is_whitespace) {
          let mut parts = trimmed[1..].split_whitespace();
          let addr_str = match parts.next() {
            Some(s) => s,
            None => {
              eprintln!("Error: 'x' requires an address, e.g., 'x 0x1000 64'");
              continue;
            }
          };
          let addr = match parse_addr(addr_str) {
            Ok(a) => a,
            Err(e) => {
              eprintln!("Error: invalid address '{}': {}", addr_str, e);
              continue;
            }
          };
          let len = match parts.next() {
            None => 64,
            Some(s) => match s.parse::<usize>() {
              Ok(n) if n > 0 => n,
              _ => {
                eprintln!("Error: invalid length '{}'", s);
                continue;
              }
            },
          };
          return Ok(Command::Examine { addr, len });
        }

        // st command: show matrix unit states
        if trimmed == "st" {
          return Ok(Command::States);
        }

        // q command: quit
        if trimmed == "q" {
          return Ok(Command::Quit);
        }

        // c command: run the test suite, then return to the prompt
        if trimmed == "c" {
          return Ok(Command::Continue);
        }

        eprintln!(
          "Unknown command: '{}'. Use Enter to step, 'si 100' to step N cycles, 'st' for unit states, 'x 0x1000 64' to dump memory, 'c' to run the suite, 'q' to quit",
          trimmed
        );
      }
      Err(ReadlineError::Interrupted) => {
        // Ctrl-C: quit
        return Ok(Command::Quit);
      }
      Err(ReadlineError::Eof) => {
        // Ctrl-D: quit
        return Ok(Command::Quit);
      }
      Err(err) => {
        return Err(io::Error::new(io::ErrorKind::Other, err));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn addresses_parse_in_hex_and_decimal() {
    assert_eq!(parse_addr("0x1000").unwrap(), 0x1000);
    assert_eq!(parse_addr("0X40").unwrap(), 0x40);
    assert_eq!(parse_addr("4096").unwrap(), 4096);
    assert!(parse_addr("zzz").is_err());
  }
}

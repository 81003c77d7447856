//! Interactive line shell on stdin: list peers, send messages, send files.

use std::path::PathBuf;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::debug;

use crate::node::{Node, NodeEvent};

const HELP: &str = "\
commands:
  devices                   list known peers
  talk <name> <text...>     send a message
  sendfile <name> <path>    send a file
  help                      show this help
  quit | exit               leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Devices,
    Talk { name: String, text: String },
    SendFile { name: String, path: PathBuf },
    Help,
    Quit,
    Empty,
}

/// Parse one input line. `Err` carries a usage hint for the user.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim_start()),
        None => (line, ""),
    };
    match word {
        "" => Ok(Command::Empty),
        "devices" => Ok(Command::Devices),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "talk" => match rest.split_once(char::is_whitespace) {
            Some((name, text)) if !text.trim().is_empty() => Ok(Command::Talk {
                name: name.to_string(),
                text: text.trim().to_string(),
            }),
            _ => Err("usage: talk <name> <text...>".to_string()),
        },
        "sendfile" => match rest.split_once(char::is_whitespace) {
            Some((name, path)) if !path.trim().is_empty() => Ok(Command::SendFile {
                name: name.to_string(),
                path: PathBuf::from(path.trim()),
            }),
            _ => Err("usage: sendfile <name> <path>".to_string()),
        },
        other => Err(format!("unknown command {other:?}; try help")),
    }
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run(node: &Node) -> std::io::Result<()> {
    let printer = tokio::spawn(print_events(node.subscribe()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{} on {}; type help for commands", node.node_name(), node.local_addr());

    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(c) => c,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };
        match command {
            Command::Empty => {}
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Devices => {
                let peers = node.list_peers().await;
                if peers.is_empty() {
                    println!("no peers yet");
                }
                let now = Instant::now();
                for p in peers {
                    println!(
                        "  {:<20} {:<22} seen {}s ago",
                        p.identity,
                        p.address,
                        p.age(now).as_secs()
                    );
                }
            }
            Command::Talk { name, text } => match node.talk(&name, &text).await {
                Ok(()) => println!("delivered to {name}"),
                Err(e) => println!("talk to {name} failed: {e}"),
            },
            Command::SendFile { name, path } => match node.send_file(&name, &path).await {
                Ok(report) => println!(
                    "sent {} to {name}: {} bytes in {} chunks, sha256 {}",
                    path.display(),
                    report.bytes,
                    report.chunks,
                    report.hash
                ),
                Err(e) => println!("sendfile to {name} failed: {e}"),
            },
        }
    }
    printer.abort();
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<NodeEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{}", describe(&event)),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(skipped = n, "console fell behind")
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn describe(event: &NodeEvent) -> String {
    match event {
        NodeEvent::PeerDiscovered { identity, address } => {
            format!("* new peer {identity} at {address}")
        }
        NodeEvent::MessageReceived {
            from,
            identity,
            text,
        } => match identity {
            Some(name) => format!("[{name}] {text}"),
            None => format!("[{from}] {text}"),
        },
        NodeEvent::FileReceived {
            from,
            path,
            verified: true,
        } => format!("* received {} from {from}", path.display()),
        NodeEvent::FileReceived {
            from,
            path,
            verified: false,
        } => format!(
            "* received {} from {from} but its hash does not match",
            path.display()
        ),
        NodeEvent::TransferFailed { from, id, reason } => {
            format!("* transfer {id} from {from} failed: {reason}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("devices"), Ok(Command::Devices));
        assert_eq!(parse_command("  "), Ok(Command::Empty));
        assert_eq!(parse_command("exit"), Ok(Command::Quit));
        assert_eq!(
            parse_command("talk bob hello there  bob"),
            Ok(Command::Talk {
                name: "bob".into(),
                text: "hello there  bob".into()
            })
        );
        assert_eq!(
            parse_command("sendfile alice /tmp/my notes.txt"),
            Ok(Command::SendFile {
                name: "alice".into(),
                path: PathBuf::from("/tmp/my notes.txt")
            })
        );
    }

    #[test]
    fn incomplete_commands_show_usage() {
        assert!(parse_command("talk bob").unwrap_err().starts_with("usage"));
        assert!(parse_command("sendfile").unwrap_err().starts_with("usage"));
        assert!(parse_command("frobnicate").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn events_read_naturally() {
        let from = "10.0.0.2:5007".parse().unwrap();
        let msg = NodeEvent::MessageReceived {
            from,
            identity: Some("bob".into()),
            text: "hi".into(),
        };
        assert_eq!(describe(&msg), "[bob] hi");
        let bad = NodeEvent::FileReceived {
            from,
            path: PathBuf::from("/inbox/a.txt"),
            verified: false,
        };
        assert!(describe(&bad).contains("does not match"));
    }
}

//! Keyboard control for a running node.
//!
//! Lines typed on stdin become [`Command`]s for the tick loop. The reader is
//! a plain thread because stdin blocks; it stops when stdin closes or the
//! loop is gone.

use std::io::BufRead;
use texsync_core::Command;
use texsync_env::Role;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Prints the key bindings.
pub fn print_controls(role: Role) {
    match role {
        Role::Authority => {
            println!("Controls:");
            println!("  2 or reset  - reset animation");
            println!("  space/regen - regenerate texture now");
            println!("  (type a command and press Enter)");
        }
        Role::Follower => {
            println!("Follower mode: mirroring the authority, controls are ignored");
        }
    }
}

/// Starts the stdin reader feeding `tx`.
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Command>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("texsync-stdin".to_string())
        .spawn(move || read_commands(std::io::stdin().lock(), tx))?;
    Ok(())
}

fn read_commands(input: impl BufRead, tx: mpsc::UnboundedSender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            }
        };
        if line.is_empty() {
            continue;
        }
        
        match line.parse::<Command>() {
            Ok(command) => {
                if tx.send(command).is_err() {
                    break;
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
    debug!("stdin closed, no more commands");
}

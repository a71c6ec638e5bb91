//! A line-oriented terminal chat on top of a [`RoomNode`].
//!
//! ```text
//! terminal-chat host <name> <port>
//! terminal-chat join <name> <local-port> <host-ip> <host-port>
//! ```
//!
//! Plain lines are public chat. `/msg <name> <text>` sends a private
//! message, `/who` lists the room, `/quit` leaves.

use std::net::IpAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use roomcast::prelude::*;

fn usage() -> ! {
    eprintln!("usage:");
    eprintln!("  terminal-chat host <name> <port>");
    eprintln!("  terminal-chat join <name> <local-port> <host-ip> <host-port>");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let node = RoomNode::new();

    node.subscribe(|event| match event {
        RoomEvent::Message(env) => match env.kind {
            MessageKind::System => println!("* {}", env.content),
            MessageKind::Private => {
                println!("[pm] {} -> {}: {}", env.from_name, env.to_name, env.content);
            }
            _ => println!("{}: {}", env.from_name, env.content),
        },
        RoomEvent::UserList(names) => println!("* members: {}", names.join(", ")),
        RoomEvent::RoomState(true) => println!("* joined the room"),
        RoomEvent::RoomState(false) => println!("* room closed"),
        RoomEvent::Error(message) => eprintln!("! {message}"),
    });

    match args.first().map(String::as_str) {
        Some("host") if args.len() == 3 => {
            let port: u16 = args[2].parse()?;
            node.create_room(&args[1], port).await?;
        }
        Some("join") if args.len() == 5 => {
            let local_port: u16 = args[2].parse()?;
            let host_ip: IpAddr = args[3].parse()?;
            let host_port: u16 = args[4].parse()?;
            node.join_room(&args[1], local_port, host_ip, host_port)
                .await?;
        }
        _ => usage(),
    }

    println!("* /msg <name> <text> for private messages, /who for members, /quit to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(rest) = line.strip_prefix("/msg ") {
            match rest.split_once(' ') {
                Some((to, text)) => node.send_chat_message(text, Some(to)),
                None => eprintln!("! usage: /msg <name> <text>"),
            }
        } else if line == "/who" {
            println!("* members: {}", node.user_list().join(", "));
        } else {
            node.send_chat_message(line, None);
        }
    }

    node.leave_room();
    // Let the leave envelope drain before the process exits.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

use bincode::{deserialize, serialize};
use shared::{Direction, Packet};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::sleep;

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

async fn send(socket: &UdpSocket, addr: SocketAddr, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

async fn recv(socket: &UdpSocket, buf: &mut [u8]) -> Result<Packet, Box<dyn std::error::Error>> {
    let (len, _) = socket.recv_from(buf).await?;
    Ok(deserialize::<Packet>(&buf[0..len])?)
}

/// Headless client that walks the whole protocol once: connect, list the
/// lobby, create a world, join it, move around, then disconnect.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = "127.0.0.1:8080".parse::<SocketAddr>()?;
    let mut buf = [0u8; 2048];

    println!("Sending connection request to {}", server_addr);
    send(&socket, server_addr, &Packet::Connect { client_version: 1 }).await?;

    match recv(&socket, &mut buf).await? {
        Packet::Connected { session_id } => {
            println!("Connected with session ID: {}", session_id);
        }
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    }

    send(&socket, server_addr, &Packet::ListWorlds).await?;
    if let Packet::WorldList { worlds } = recv(&socket, &mut buf).await? {
        println!("Lobby listing ({} worlds):", worlds.len());
        for w in &worlds {
            println!("  {} size={} players={}", w.id, w.size, w.player_count);
        }
    }

    send(&socket, server_addr, &Packet::CreateWorld { size: Some(12) }).await?;
    let world_id = match recv(&socket, &mut buf).await? {
        Packet::WorldCreated { world_id } => {
            println!("Created world {}", world_id);
            world_id
        }
        other => {
            println!("Expected WorldCreated but got: {:?}", other);
            return Ok(());
        }
    };

    send(
        &socket,
        server_addr,
        &Packet::JoinWorld {
            world_id: world_id.clone(),
        },
    )
    .await?;
    match recv(&socket, &mut buf).await? {
        Packet::Joined {
            world_id,
            player_id,
            world,
        } => {
            let pos = world.players[&player_id].position;
            println!(
                "Joined {} as {} at ({}, {})",
                world_id, player_id, pos.x, pos.y
            );
        }
        other => println!("Unexpected packet: {:?}", other),
    }

    // Walk a small square, printing each broadcast snapshot
    let directions = [
        Direction::Right,
        Direction::Down,
        Direction::Left,
        Direction::Up,
    ];
    for direction in directions {
        send(&socket, server_addr, &Packet::Move { direction }).await?;
        send(
            &socket,
            server_addr,
            &Packet::Heartbeat {
                timestamp: get_timestamp(),
            },
        )
        .await?;

        match recv(&socket, &mut buf).await {
            Ok(Packet::WorldUpdate { world }) => {
                println!("World update - size: {}, players: {}", world.size, world.players.len());
                for (id, state) in &world.players {
                    println!(
                        "  {}: ({}, {}){}",
                        id,
                        state.position.x,
                        state.position.y,
                        if state.bot { " [bot]" } else { "" }
                    );
                }
            }
            Ok(other) => println!("Unexpected packet: {:?}", other),
            Err(e) => println!("Error receiving world update: {}", e),
        }

        sleep(Duration::from_millis(500)).await;
    }

    println!("Sending disconnect request");
    send(&socket, server_addr, &Packet::Disconnect).await?;
    println!("Test client finished");

    Ok(())
}

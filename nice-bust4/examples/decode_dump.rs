//! BusT4 Frame Dump Decoder
//!
//! Decodes hex dumps captured from the bus and shows how the engine would
//! interpret them. Each argument is one stream of bytes; separators such as
//! spaces, dots or dashes are ignored.
//!
//! ```text
//! cargo run --example decode_dump -- "55.0C.00.FF.00.66.01.05.9D.01.82.01.64.E6.0C"
//! RUST_LOG=debug cargo run --example decode_dump -- 550c00ff00660105...
//! ```

use std::time::Instant;

use nice_bust4::interpreter::IdentityField;
use nice_bust4::receiver::FrameReceiver;
use nice_bust4::{
    parse_hex_command, ControlCommand, EngineConfig, Identity, Message, Packet, ProtocolEngine,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let dumps: Vec<String> = std::env::args().skip(1).collect();
    if dumps.is_empty() {
        eprintln!("usage: decode_dump <hex stream> [<hex stream> ...]");
        std::process::exit(2);
    }

    let config = EngineConfig::default();
    let mut engine = ProtocolEngine::new(config.clone());
    let mut receiver = FrameReceiver::new(config.rx_timeout);
    let now = Instant::now();

    for (n, dump) in dumps.iter().enumerate() {
        let bytes = parse_hex_command(dump)?;
        println!("Stream {} ({} bytes)", n + 1, bytes.len());
        println!("================================");

        for byte in &bytes {
            match receiver.push(*byte, now) {
                Some(Ok(frame)) => {
                    let packet = Packet::from_frame(&frame);
                    println!("  frame  {}", hex::encode_upper(frame.as_bytes()));
                    println!("  from   {} to {}", packet.source, packet.destination);
                    describe(&packet.message);
                }
                Some(Err(err)) => println!("  rejected: {}", err),
                None => {}
            }
        }

        if let Some(state) = engine.on_bytes(&bytes, now) {
            println!("  cover  {:?} at {}%", state.state, state.percent());
        }
        println!();
    }

    let stats = receiver.stats();
    println!("Summary");
    println!("=======");
    println!("  frames ok:       {}", stats.frames_ok);
    println!("  malformed:       {}", stats.malformed);
    println!("  discarded bytes: {}", stats.discarded_bytes);
    println!("  drive:           {}", engine.drive_address());
    println!(
        "  manufacturer:    {}",
        Identity::text(engine.identity().get(IdentityField::Manufacturer))
    );
    for fault in engine.drain_faults() {
        println!("  fault:           {}", fault.error);
    }

    Ok(())
}

fn describe(message: &Message) {
    match message {
        Message::Control { command } => {
            let name = ControlCommand::from_u8(*command)
                .map(|c| c.name())
                .unwrap_or("unknown");
            println!("  CMD    control {} (0x{:02X})", name, command);
        }
        Message::InfoRequest(req) => println!(
            "  INF    request whose=0x{:02X} submenu=0x{:02X} run=0x{:02X} data={}",
            req.whose,
            req.submenu,
            req.run,
            hex::encode_upper(&req.data)
        ),
        Message::InfoResponse(rsp) => println!(
            "  INF    response whose=0x{:02X} submenu=0x{:02X} run=0x{:02X} err=0x{:02X} data={}",
            rsp.whose,
            rsp.submenu,
            rsp.run,
            rsp.error,
            hex::encode_upper(&rsp.data)
        ),
        Message::CommandReply(reply) if reply.is_status() => println!(
            "  INF    status 0x{:02X} position {}",
            reply.sub_run, reply.value
        ),
        Message::CommandReply(reply) => println!(
            "  INF    command echo 0x{:02X} err=0x{:02X}",
            reply.sub_run, reply.error
        ),
        Message::Unknown { message_type, body } => println!(
            "  ???    type 0x{:02X} body {}",
            message_type,
            hex::encode_upper(body)
        ),
    }
}

use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use socket2::{Domain, Socket, Type};

use rft::io::FileSink;
use rft::receiver::ReceiverState;
use rft::wire::{self, PacketType};
use rft::{payload_size, Error};

const SOCKET_BUF_BYTES: usize = 8 * 1024 * 1024;

/// Reliable-UDP receiver with selective-repeat and SACK.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Destination file for the received payload.
    output: PathBuf,

    #[arg(long, default_value_t = 9000)]
    port: u16,

    #[arg(long, default_value_t = 1500)]
    mtu: u32,

    /// Legacy flag from the original lab harness, accepted and ignored.
    #[arg(long, value_name = "MS")]
    rtt: Option<String>,

    /// Legacy flag from the original lab harness, accepted and ignored.
    #[arg(long, value_name = "PCT")]
    loss: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let _ = (&args.rtt, &args.loss); // accepted, intentionally unused

    if args.mtu < 576 {
        eprintln!("MTU too small.");
        return ExitCode::from(2);
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::SizeMismatch { expected, received }) => {
            eprintln!("Receiver WARNING: size mismatch, expected {expected} got {received}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    let payload_max = payload_size(args.mtu);

    let socket = bind_socket(args.port)?;
    tracing::info!(port = args.port, mtu = args.mtu, payload_max, "listening");

    let mut state: Option<ReceiverState<FileSink>> = None;
    let mut buf = vec![0u8; wire::HEADER_LEN + payload_max as usize + 16];
    let t0 = Instant::now();

    loop {
        let (n, peer) = socket.recv_from(&mut buf)?;
        let Some(pkt) = wire::decode(&buf[..n]) else {
            continue;
        };

        match pkt.kind {
            PacketType::Start => {
                let Some(total_len) = wire::parse_start_payload(pkt.payload) else {
                    continue;
                };
                if total_len == 0 {
                    continue;
                }
                handle_start(&socket, &mut state, &args.output, peer, total_len, payload_max)?;
            }
            PacketType::Data => {
                if let Some(st) = state.as_mut() {
                    if let Some(ack) = st.data(peer, pkt.seq, pkt.payload) {
                        socket.send_to(&ack, peer)?;
                    }
                }
            }
            PacketType::End => {
                if let Some(st) = state.as_mut() {
                    if let Some(reply) = st.end(peer) {
                        socket.send_to(&reply.ack, peer)?;
                        if reply.terminal {
                            break;
                        }
                    }
                }
            }
            PacketType::Ack => { /* receiver never expects ACKs */ }
        }
    }

    let state = state.expect("terminal session must have been started");
    let secs = t0.elapsed().as_secs_f64();
    let bits = state.received() as f64 * 8.0;
    println!(
        "Receiver: got {} bytes in {:.3} s, avg {:.3} Mb/s",
        state.received(),
        secs,
        (bits / 1e6) / secs.max(f64::EPSILON)
    );

    if state.received() != state.total_len() {
        return Err(Error::SizeMismatch {
            expected: state.total_len(),
            received: state.received(),
        });
    }
    Ok(())
}

fn handle_start(
    socket: &UdpSocket,
    state: &mut Option<ReceiverState<FileSink>>,
    output: &std::path::Path,
    peer: SocketAddr,
    total_len: u64,
    payload_max: u32,
) -> Result<(), Error> {
    if let Some(st) = state.as_ref() {
        if let Some(ack) = st.restart(peer) {
            socket.send_to(&ack, peer)?;
        }
        return Ok(());
    }

    let output = output.to_path_buf();
    let (new_state, ack) = ReceiverState::start(peer, total_len, payload_max, move |len| {
        FileSink::create(&output, len)
    })?;
    tracing::info!(total_len, segments = new_state.num_segments(), %peer, "session started");
    *state = Some(new_state);
    socket.send_to(&ack, peer)?;
    Ok(())
}

fn bind_socket(port: u16) -> Result<UdpSocket, Error> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_recv_buffer_size(SOCKET_BUF_BYTES)?;
    socket.set_send_buffer_size(SOCKET_BUF_BYTES)?;
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

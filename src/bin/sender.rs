use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use socket2::{Domain, Socket, Type};

use rft::io::FileSource;
use rft::payload_size;
use rft::sender::SenderState;
use rft::wire::{self, PacketType};
use rft::Error;

const SOCKET_BUF_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_WINDOW: u32 = 64;

/// Reliable-UDP sender with selective-repeat and SACK.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// IPv4 address of the receiver.
    server_ip: IpAddr,
    /// File to transmit.
    input: PathBuf,

    #[arg(long, default_value_t = 9000)]
    port: u16,

    #[arg(long, default_value_t = 1500)]
    mtu: u32,

    #[arg(long = "rto_ms", default_value_t = 400)]
    rto_ms: u64,

    #[arg(long, default_value_t = 50)]
    retries: u32,

    #[arg(long = "win", default_value_t = DEFAULT_WINDOW)]
    win: u32,

    /// Advisory; this implementation makes no zero-copy distinction.
    #[arg(long, default_value_t = 1)]
    zerocopy: u8,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if args.mtu < 576 {
        eprintln!("MTU too small.");
        return ExitCode::from(2);
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    let payload_max = payload_size(args.mtu);
    let window = if args.win < 1 || args.win > 256 {
        DEFAULT_WINDOW
    } else {
        args.win
    };
    let rto = Duration::from_millis(args.rto_ms);

    let source = FileSource::open(&args.input)?;
    let mut state = SenderState::new(source, payload_max, window, rto, args.retries)?;

    let peer = SocketAddr::new(args.server_ip, args.port);
    let socket = connect_socket(peer, rto)?;

    tracing::info!(
        mtu = args.mtu,
        payload_max,
        rto_ms = args.rto_ms,
        retries = args.retries,
        window,
        zerocopy = args.zerocopy,
        segments = state.num_segments(),
        "starting transfer"
    );

    handshake(&socket, &mut state, args.retries)?;

    let t0 = Instant::now();
    let mut buf = [0u8; 128];
    while !state.is_bulk_complete() {
        for pkt in state.emit_window(Instant::now())? {
            socket.send(&pkt)?;
        }

        if let Some((cum, mask)) = recv_ack(&socket, &mut buf)? {
            state.on_ack(cum, mask);
        }

        for pkt in state.retransmit_stale(Instant::now())? {
            socket.send(&pkt)?;
        }
    }

    drain(&socket, &mut state, args.retries)?;

    let secs = t0.elapsed().as_secs_f64();
    let bits = state.total_len() as f64 * 8.0;
    println!(
        "Sender: sent {} bytes in {:.3} s, avg {:.3} Mb/s",
        state.total_len(),
        secs,
        (bits / 1e6) / secs.max(f64::EPSILON)
    );
    Ok(())
}

fn handshake(socket: &UdpSocket, state: &mut SenderState<FileSource>, retries: u32) -> Result<(), Error> {
    let start_pkt = state.begin_handshake();
    let mut buf = [0u8; 64];
    for attempt in 0..retries {
        socket.send(&start_pkt)?;
        if recv_ack(socket, &mut buf)?.is_some() {
            state.complete_handshake();
            return Ok(());
        }
        tracing::debug!(attempt, "handshake retry");
    }
    state.fail();
    Err(Error::HandshakeFailed)
}

fn drain(socket: &UdpSocket, state: &mut SenderState<FileSource>, retries: u32) -> Result<(), Error> {
    let end_pkt = state.begin_drain();
    let mut buf = [0u8; 64];
    for attempt in 0..retries {
        socket.send(&end_pkt)?;
        if recv_ack(socket, &mut buf)?.is_some() {
            state.complete_drain();
            return Ok(());
        }
        tracing::debug!(attempt, "END retry");
    }
    state.fail();
    Err(Error::EndFailed)
}

/// Blocks for up to one RTO for a datagram; returns `Some((cum_ack,
/// sack_mask))` for any well-formed ACK (its `cum_ack` value is
/// irrelevant to the caller during handshake/drain), `None` on timeout
/// or any other packet kind.
fn recv_ack(socket: &UdpSocket, buf: &mut [u8]) -> Result<Option<(u32, u64)>, Error> {
    match socket.recv(buf) {
        Ok(n) => {
            let Some(pkt) = wire::decode(&buf[..n]) else {
                return Ok(None);
            };
            if pkt.kind != PacketType::Ack {
                return Ok(None);
            }
            Ok(wire::parse_ack_payload(pkt.payload))
        }
        Err(e) if is_timeout(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn connect_socket(peer: SocketAddr, rto: Duration) -> Result<UdpSocket, Error> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_recv_buffer_size(SOCKET_BUF_BYTES)?;
    socket.set_send_buffer_size(SOCKET_BUF_BYTES)?;
    socket.set_read_timeout(Some(rto))?;
    socket.connect(&peer.into())?;
    Ok(socket.into())
}

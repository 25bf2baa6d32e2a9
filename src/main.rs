//! Drive one TCP conversation by hand.
//!
//! Resolves the peer over ARP, then runs SYN / SYN-ACK / ACK, one data
//! segment and FIN / FIN-ACK / ACK, printing every header on the way.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use toy_handshake::iface::device;
use toy_handshake::iface::{
    Connection, Direction, IpAddr, LinkTransport, MacAddr, PacketSocket, SessionConfig,
    TapTransport, Wait,
};
use toy_handshake::network::ipv4::MAX_BODY_LEN;
use toy_handshake::network::{ethertype, ArpResolver, IpPacket};
use toy_handshake::transport::tcp::TCP_HEADER_LEN;
use toy_handshake::transport::{Endpoint, TcpSegment};
use toy_handshake::{Error, Result};

#[derive(Debug, Parser)]
#[command(
    name = "toy-handshake",
    about = "Hand-driven TCP handshake over a raw interface"
)]
struct Args {
    /// Network interface to send on (e.g. eth0)
    interface: String,

    /// Local TCP port
    local_port: u16,

    /// Peer IPv4 address
    dest_ip: IpAddr,

    /// Peer TCP port
    dest_port: u16,

    /// Receive timeout per wait in milliseconds; 0 waits forever
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Advertised window
    #[arg(long, default_value_t = 64240)]
    window: u16,

    /// Payload of the data segment
    #[arg(long, default_value = "HELLO TCP")]
    message: String,

    /// Local IPv4 address instead of querying the interface
    #[arg(long)]
    local_ip: Option<IpAddr>,

    /// Local MAC address instead of querying the interface
    #[arg(long)]
    local_mac: Option<MacAddr>,

    /// Use the TAP device named by <INTERFACE> instead of a packet socket
    #[arg(long, requires_all = ["local_ip", "local_mac"])]
    tap: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if args.message.len() > MAX_BODY_LEN - TCP_HEADER_LEN {
        return Err(Error::Config(format!(
            "message of {} bytes does not fit one segment (max {})",
            args.message.len(),
            MAX_BODY_LEN - TCP_HEADER_LEN
        )));
    }

    let local_ip = match args.local_ip {
        Some(ip) => ip,
        None => device::ip_of(&args.interface)?,
    };
    let local_mac = match args.local_mac {
        Some(mac) => mac,
        None => device::mac_of(&args.interface)?,
    };
    info!(interface = %args.interface, %local_ip, %local_mac, "local addresses");

    let wait = match args.timeout_ms {
        0 => Wait::forever(),
        ms => Wait::timeout(Duration::from_millis(ms)),
    };

    if args.tap {
        let arp = TapTransport::open(&args.interface, local_mac, ethertype::ARP)?;
        let ip = arp.with_ethertype(ethertype::IPV4);
        session(args, arp, ip, local_ip, local_mac, wait)
    } else {
        let arp = PacketSocket::open(ethertype::ARP)?;
        let ip = PacketSocket::open(ethertype::IPV4)?;
        session(args, arp, ip, local_ip, local_mac, wait)
    }
}

fn session<A, T>(
    args: &Args,
    mut arp: A,
    ip: T,
    local_ip: IpAddr,
    local_mac: MacAddr,
    wait: Wait,
) -> Result<()>
where
    A: LinkTransport,
    T: LinkTransport,
{
    let resolver = ArpResolver::new(args.interface.as_str(), local_mac, local_ip);
    let remote_mac = resolver.resolve(&mut arp, args.dest_ip, &wait)?;
    drop(arp);

    let config = SessionConfig {
        window: args.window,
        wait,
        ..SessionConfig::default()
    };
    let mut conn = Connection::new(
        ip,
        args.interface.as_str(),
        Endpoint::new(local_ip, args.local_port),
        Endpoint::new(args.dest_ip, args.dest_port),
        remote_mac,
    )
    .with_config(config)
    .on_segment(print_segment);

    conn.run(args.message.as_bytes())
}

fn print_segment(direction: Direction, packet: &IpPacket, segment: &TcpSegment) {
    let label = match direction {
        Direction::Sent => "sent",
        Direction::Received => "received",
    };
    println!("======= {} ip packet ======", label);
    println!("{}", packet.header());
    println!("======= {} tcp segment ======", label);
    println!("{}", segment);
}

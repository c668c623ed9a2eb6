//! # Link Transports
//!
//! Blocking byte transports for the vehicle link: UDP (listen or fixed peer),
//! TCP, and serial. The reader thread owns one handle for receiving and the
//! beacon sender owns a clone for writing.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{GatewayError, Result};

/// Default endpoint: listen for an autopilot or router on the standard GCS port
pub const DEFAULT_ENDPOINT: &str = "udpin:0.0.0.0:14550";

/// Default baud rate for telemetry radios and USB autopilots
pub const DEFAULT_SERIAL_BAUD: u32 = 57_600;

/// Byte-level link I/O
///
/// `recv` blocks for at most `timeout` and returns `Ok(None)` when nothing
/// arrived. Implementations must be usable from two threads through
/// [`LinkIo::try_clone`].
#[cfg_attr(test, mockall::automock)]
pub trait LinkIo: Send {
    /// Receive up to `buf.len()` bytes
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;

    /// Send one complete frame
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Independent handle to the same link
    fn try_clone(&self) -> io::Result<Box<dyn LinkIo>>;
}

/// Opens link transports; implemented by [`Endpoint`] and by plain closures
pub trait Connector: Send + Sync {
    /// Open a fresh transport, giving up on connection-oriented links
    /// after `timeout`
    fn connect(&self, timeout: Duration) -> Result<Box<dyn LinkIo>>;

    /// Human-readable target for logs
    fn describe(&self) -> String {
        "custom link".to_string()
    }
}

impl<F> Connector for F
where
    F: Fn(Duration) -> Result<Box<dyn LinkIo>> + Send + Sync,
{
    fn connect(&self, timeout: Duration) -> Result<Box<dyn LinkIo>> {
        self(timeout)
    }
}

/// True for receive errors that mean the link is gone rather than hiccuping
pub fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Socket timeouts must be non-zero
fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

/// Vehicle link endpoint, written the way MAVLink tools spell them
///
/// | Form | Meaning |
/// |---|---|
/// | `udpin:HOST:PORT`, `udp:HOST:PORT` | bind and reply to whoever sent last |
/// | `udpout:HOST:PORT` | send to a fixed peer |
/// | `tcp:HOST:PORT` | connect a TCP stream |
/// | `serial:PATH:BAUD`, `/dev/ttyACM0[:BAUD]` | open a serial port |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    UdpIn(String),
    UdpOut(String),
    Tcp(String),
    Serial { path: String, baud: u32 },
}

impl FromStr for Endpoint {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with('/') || s.starts_with("COM") {
            return parse_serial(s);
        }

        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| GatewayError::InvalidEndpoint(format!("missing scheme in '{}'", s)))?;

        match scheme.to_ascii_lowercase().as_str() {
            "udpin" | "udp" => Ok(Self::UdpIn(parse_host_port(rest)?)),
            "udpout" => Ok(Self::UdpOut(parse_host_port(rest)?)),
            "tcp" => Ok(Self::Tcp(parse_host_port(rest)?)),
            "serial" => parse_serial(rest),
            other => Err(GatewayError::InvalidEndpoint(format!(
                "unknown scheme '{}' in '{}'",
                other, s
            ))),
        }
    }
}

fn parse_host_port(s: &str) -> Result<String> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| GatewayError::InvalidEndpoint(format!("expected HOST:PORT, got '{}'", s)))?;

    if host.is_empty() {
        return Err(GatewayError::InvalidEndpoint(format!("empty host in '{}'", s)));
    }
    port.parse::<u16>()
        .map_err(|_| GatewayError::InvalidEndpoint(format!("invalid port '{}'", port)))?;

    Ok(s.to_string())
}

fn parse_serial(s: &str) -> Result<Endpoint> {
    if s.is_empty() {
        return Err(GatewayError::InvalidEndpoint("empty serial device".to_string()));
    }

    let (path, baud) = match s.rsplit_once(':') {
        Some((path, baud)) if !path.is_empty() => match baud.parse::<u32>() {
            Ok(baud) if baud > 0 => (path, baud),
            _ => {
                return Err(GatewayError::InvalidEndpoint(format!(
                    "invalid baud rate '{}'",
                    baud
                )))
            }
        },
        _ => (s, DEFAULT_SERIAL_BAUD),
    };

    Ok(Endpoint::Serial {
        path: path.to_string(),
        baud,
    })
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UdpIn(addr) => write!(f, "udpin:{}", addr),
            Self::UdpOut(addr) => write!(f, "udpout:{}", addr),
            Self::Tcp(addr) => write!(f, "tcp:{}", addr),
            Self::Serial { path, baud } => write!(f, "serial:{}:{}", path, baud),
        }
    }
}

impl Endpoint {
    /// Open the transport this endpoint names
    ///
    /// A TCP connect that has not completed within `connect_timeout` fails.
    ///
    /// # Errors
    ///
    /// Returns error if the address does not resolve, the socket cannot be
    /// bound or connected, or the serial device cannot be opened.
    pub fn open(&self, connect_timeout: Duration) -> Result<Box<dyn LinkIo>> {
        match self {
            Self::UdpIn(addr) => {
                let socket = UdpSocket::bind(resolve(addr)?)?;
                info!("Listening for vehicle on udp {}", socket.local_addr()?);
                Ok(Box::new(UdpLink::new(socket, None)))
            }
            Self::UdpOut(addr) => {
                let peer = resolve(addr)?;
                let bind: SocketAddr = if peer.is_ipv4() {
                    ([0, 0, 0, 0], 0).into()
                } else {
                    ([0u16; 8], 0).into()
                };
                let socket = UdpSocket::bind(bind)?;
                info!("Sending to vehicle at udp {}", peer);
                Ok(Box::new(UdpLink::new(socket, Some(peer))))
            }
            Self::Tcp(addr) => {
                let stream =
                    TcpStream::connect_timeout(&resolve(addr)?, clamp_timeout(connect_timeout))?;
                stream.set_nodelay(true)?;
                info!("Connected to vehicle at tcp {}", addr);
                Ok(Box::new(TcpLink { stream }))
            }
            Self::Serial { path, baud } => {
                let port = tokio_serial::new(path, *baud)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .parity(tokio_serial::Parity::None)
                    .stop_bits(tokio_serial::StopBits::One)
                    .flow_control(tokio_serial::FlowControl::None)
                    .timeout(Duration::from_millis(100))
                    .open()
                    .map_err(|e| GatewayError::Serial(format!("Failed to open {}: {}", path, e)))?;
                info!("Opened serial link {} at {} baud", path, baud);
                Ok(Box::new(SerialLink { port }))
            }
        }
    }
}

impl Connector for Endpoint {
    fn connect(&self, timeout: Duration) -> Result<Box<dyn LinkIo>> {
        self.open(timeout)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| GatewayError::InvalidEndpoint(format!("'{}' did not resolve", addr)))
}

/// UDP link; when no fixed peer is given, replies go to the latest sender
struct UdpLink {
    socket: UdpSocket,
    peer: Arc<Mutex<Option<SocketAddr>>>,
    learn_peer: bool,
}

impl UdpLink {
    fn new(socket: UdpSocket, fixed_peer: Option<SocketAddr>) -> Self {
        Self {
            socket,
            learn_peer: fixed_peer.is_none(),
            peer: Arc::new(Mutex::new(fixed_peer)),
        }
    }
}

impl LinkIo for UdpLink {
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        self.socket.set_read_timeout(Some(clamp_timeout(timeout)))?;
        match self.socket.recv_from(buf) {
            Ok((n, from)) => {
                if self.learn_peer {
                    let mut peer = self.peer.lock().unwrap_or_else(PoisonError::into_inner);
                    if *peer != Some(from) {
                        debug!("Vehicle peer is now {}", from);
                        *peer = Some(from);
                    }
                }
                Ok(Some(n))
            }
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let peer = *self.peer.lock().unwrap_or_else(PoisonError::into_inner);
        match peer {
            Some(addr) => self.socket.send_to(data, addr).map(|_| ()),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no vehicle has sent to this endpoint yet",
            )),
        }
    }

    fn try_clone(&self) -> io::Result<Box<dyn LinkIo>> {
        Ok(Box::new(Self {
            socket: self.socket.try_clone()?,
            peer: Arc::clone(&self.peer),
            learn_peer: self.learn_peer,
        }))
    }
}

struct TcpLink {
    stream: TcpStream,
}

impl LinkIo for TcpLink {
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        self.stream.set_read_timeout(Some(clamp_timeout(timeout)))?;
        match self.stream.read(buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "vehicle closed the TCP stream",
            )),
            Ok(n) => Ok(Some(n)),
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    fn try_clone(&self) -> io::Result<Box<dyn LinkIo>> {
        Ok(Box::new(Self {
            stream: self.stream.try_clone()?,
        }))
    }
}

struct SerialLink {
    port: Box<dyn tokio_serial::SerialPort>,
}

impl LinkIo for SerialLink {
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        self.port.set_timeout(clamp_timeout(timeout))?;
        match self.port.read(buf) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(n)),
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn try_clone(&self) -> io::Result<Box<dyn LinkIo>> {
        Ok(Box::new(Self {
            port: self.port.try_clone()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_default_endpoint_parses() {
        let endpoint: Endpoint = DEFAULT_ENDPOINT.parse().unwrap();
        assert_eq!(endpoint, Endpoint::UdpIn("0.0.0.0:14550".to_string()));
        assert_eq!(endpoint.to_string(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_parse_schemes() {
        assert_eq!(
            "udp:127.0.0.1:14551".parse::<Endpoint>().unwrap(),
            Endpoint::UdpIn("127.0.0.1:14551".to_string())
        );
        assert_eq!(
            "udpout:10.0.0.5:14550".parse::<Endpoint>().unwrap(),
            Endpoint::UdpOut("10.0.0.5:14550".to_string())
        );
        assert_eq!(
            "tcp:localhost:5760".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("localhost:5760".to_string())
        );
    }

    #[test]
    fn test_parse_serial_forms() {
        assert_eq!(
            "serial:/dev/ttyUSB0:115200".parse::<Endpoint>().unwrap(),
            Endpoint::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud: 115_200
            }
        );
        assert_eq!(
            "/dev/ttyACM0".parse::<Endpoint>().unwrap(),
            Endpoint::Serial {
                path: "/dev/ttyACM0".to_string(),
                baud: DEFAULT_SERIAL_BAUD
            }
        );
        assert_eq!(
            "/dev/ttyACM0:921600".parse::<Endpoint>().unwrap(),
            Endpoint::Serial {
                path: "/dev/ttyACM0".to_string(),
                baud: 921_600
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_endpoints() {
        for bad in [
            "",
            "14550",
            "ftp:host:21",
            "udpin:0.0.0.0",
            "udpin::14550",
            "tcp:host:notaport",
            "serial:/dev/ttyUSB0:fast",
        ] {
            assert!(
                matches!(bad.parse::<Endpoint>(), Err(GatewayError::InvalidEndpoint(_))),
                "'{}' should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_disconnect_classification() {
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::InvalidData)));
    }

    #[test]
    fn test_udp_link_learns_peer_and_replies() {
        let gcs = UdpSocket::bind("127.0.0.1:0").unwrap();
        let gcs_addr = gcs.local_addr().unwrap();
        let mut link = UdpLink::new(gcs, None);
        let mut buf = [0u8; 16];

        // Nobody has talked to us yet
        let err = link.send(b"hello").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert_eq!(link.recv(&mut buf, Duration::from_millis(5)).unwrap(), None);

        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();
        vehicle.send_to(b"ping", gcs_addr).unwrap();
        let n = link.recv(&mut buf, Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(&buf[..n], b"ping");

        // Clones share the learned peer
        let mut writer = link.try_clone().unwrap();
        writer.send(b"pong").unwrap();

        vehicle.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let (n, _) = vehicle.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[test]
    fn test_udpout_sends_to_fixed_peer() {
        let vehicle = UdpSocket::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::UdpOut(vehicle.local_addr().unwrap().to_string());
        let mut link = endpoint.open(OPEN_TIMEOUT).unwrap();

        link.send(b"hb").unwrap();

        let mut buf = [0u8; 8];
        vehicle.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let (n, _) = vehicle.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hb");
    }

    #[test]
    fn test_tcp_link_reports_close_as_disconnect() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let endpoint = Endpoint::Tcp(addr.to_string());
        let mut link = endpoint.open(OPEN_TIMEOUT).unwrap();
        let (server_side, _) = listener.accept().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(link.recv(&mut buf, Duration::from_millis(5)).unwrap(), None);

        drop(server_side);
        let err = link.recv(&mut buf, Duration::from_secs(2)).unwrap_err();
        assert!(is_disconnect(&err));
    }

    #[test]
    fn test_tcp_connect_gives_up_after_timeout() {
        // Non-routable; the SYN is dropped or rejected, never answered
        let endpoint = Endpoint::Tcp("10.255.255.1:5760".to_string());

        let started = std::time::Instant::now();
        let result = endpoint.open(Duration::from_millis(200));

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_open_missing_serial_device_fails() {
        let endpoint = Endpoint::Serial {
            path: "/dev/nonexistent_mav_device_12345".to_string(),
            baud: DEFAULT_SERIAL_BAUD,
        };
        match endpoint.open(OPEN_TIMEOUT) {
            Err(GatewayError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_mav_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            Err(other) => panic!("Expected Serial error, got: {:?}", other),
            Ok(_) => panic!("Opening a missing device should fail"),
        }
    }
}

use crate::config::TransportTimeouts;
use parking_lot::Mutex;
use std::{io, net::SocketAddr, time::Instant};
use tokio::{net::UdpSocket, time::timeout};

pub(crate) const RECV_BUFFER_SIZE: usize = 2500;

/// Attempts to find a free even/odd port pair when binding to port 0
const PORT_PAIR_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Rtp,
    Rtcp,
}

/// Socket of a media session, registered by the signalling layer in its event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDescriptor {
    pub component: Component,
    pub local_addr: SocketAddr,
    #[cfg(unix)]
    pub raw_fd: std::os::fd::RawFd,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {component:?} socket to {addr}")]
    Bind {
        component: Component,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("no free port pair found for {0}")]
    NoPortPair(SocketAddr),
    #[error("destination {0} is not registered")]
    DestinationNotFound(SocketAddr),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Destination {
    rtp: SocketAddr,
    rtcp: SocketAddr,
}

impl Destination {
    fn new(rtp: SocketAddr) -> Self {
        let mut rtcp = rtp;
        rtcp.set_port(rtp.port().wrapping_add(1));

        Self { rtp, rtcp }
    }
}

/// Packet waiting to be sent, dropped if it could not be sent before the expiry timeout
#[derive(Debug)]
pub(crate) struct OutboundPacket {
    pub(crate) data: Vec<u8>,
    pub(crate) created: Instant,
}

impl OutboundPacket {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            created: Instant::now(),
        }
    }
}

/// RTP & RTCP socket pair of a session and the remote destinations it sends to
#[derive(Debug)]
pub(crate) struct RtpTransport {
    rtp: UdpSocket,
    rtcp: UdpSocket,
    destinations: Mutex<Vec<Destination>>,
    timeouts: Mutex<TransportTimeouts>,
}

impl RtpTransport {
    /// Bind RTP to `local_addr` and RTCP to the next port
    pub(crate) async fn bind(
        local_addr: SocketAddr,
        timeouts: TransportTimeouts,
    ) -> Result<Self, TransportError> {
        let (rtp, rtcp) = if local_addr.port() == 0 {
            bind_any_pair(local_addr).await?
        } else {
            bind_pair(local_addr).await?
        };

        log::debug!(
            "bound media sockets rtp={} rtcp={}",
            rtp.local_addr()?,
            rtcp.local_addr()?
        );

        Ok(Self {
            rtp,
            rtcp,
            destinations: Mutex::new(vec![]),
            timeouts: Mutex::new(timeouts),
        })
    }

    pub(crate) fn set_timeouts(&self, timeouts: TransportTimeouts) {
        *self.timeouts.lock() = timeouts;
    }

    pub(crate) fn descriptors(&self) -> Vec<TransportDescriptor> {
        [(Component::Rtp, &self.rtp), (Component::Rtcp, &self.rtcp)]
            .into_iter()
            .filter_map(|(component, socket)| {
                let local_addr = socket
                    .local_addr()
                    .inspect_err(|e| {
                        log::warn!("failed to get local address of {component:?} socket, {e}")
                    })
                    .ok()?;

                Some(TransportDescriptor {
                    component,
                    local_addr,
                    #[cfg(unix)]
                    raw_fd: std::os::fd::AsRawFd::as_raw_fd(socket),
                })
            })
            .collect()
    }

    pub(crate) fn add_destination(&self, rtp: SocketAddr) {
        let destination = Destination::new(rtp);
        let mut destinations = self.destinations.lock();

        if !destinations.contains(&destination) {
            destinations.push(destination);
        }
    }

    pub(crate) fn remove_destination(&self, rtp: SocketAddr) -> Result<(), TransportError> {
        let mut destinations = self.destinations.lock();
        let len = destinations.len();

        destinations.retain(|destination| destination.rtp != rtp);

        if destinations.len() == len {
            return Err(TransportError::DestinationNotFound(rtp));
        }

        Ok(())
    }

    pub(crate) async fn send_rtp(&self, packet: &OutboundPacket) {
        self.send(Component::Rtp, packet).await
    }

    pub(crate) async fn send_rtcp(&self, packet: &OutboundPacket) {
        self.send(Component::Rtcp, packet).await
    }

    async fn send(&self, component: Component, packet: &OutboundPacket) {
        let timeouts = *self.timeouts.lock();

        if packet.created.elapsed() > timeouts.expire {
            log::debug!("dropping expired {component:?} packet");
            return;
        }

        let (socket, targets): (_, Vec<SocketAddr>) = {
            let destinations = self.destinations.lock();

            match component {
                Component::Rtp => (&self.rtp, destinations.iter().map(|d| d.rtp).collect()),
                Component::Rtcp => (&self.rtcp, destinations.iter().map(|d| d.rtcp).collect()),
            }
        };

        for target in targets {
            match timeout(timeouts.scheduling, socket.send_to(&packet.data, target)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log::warn!("failed to send {component:?} packet to {target}, {e}"),
                Err(_) => log::warn!("sending {component:?} packet to {target} timed out"),
            }
        }
    }

    pub(crate) async fn recv_rtp(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.rtp.recv_from(buf).await
    }

    pub(crate) async fn recv_rtcp(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.rtcp.recv_from(buf).await
    }
}

async fn bind_socket(component: Component, addr: SocketAddr) -> Result<UdpSocket, TransportError> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            component,
            addr,
            source,
        })
}

async fn bind_pair(rtp_addr: SocketAddr) -> Result<(UdpSocket, UdpSocket), TransportError> {
    let mut rtcp_addr = rtp_addr;
    rtcp_addr.set_port(rtp_addr.port().wrapping_add(1));

    let rtp = bind_socket(Component::Rtp, rtp_addr).await?;
    let rtcp = bind_socket(Component::Rtcp, rtcp_addr).await?;

    Ok((rtp, rtcp))
}

/// Let the OS pick an even RTP port with a free successor for RTCP
async fn bind_any_pair(addr: SocketAddr) -> Result<(UdpSocket, UdpSocket), TransportError> {
    for _ in 0..PORT_PAIR_ATTEMPTS {
        let rtp = bind_socket(Component::Rtp, addr).await?;
        let port = rtp.local_addr()?.port();

        if port % 2 != 0 || port == u16::MAX {
            continue;
        }

        let mut rtcp_addr = addr;
        rtcp_addr.set_port(port + 1);

        match UdpSocket::bind(rtcp_addr).await {
            Ok(rtcp) => return Ok((rtp, rtcp)),
            Err(e) => log::debug!("port {} is not available, {e}", port + 1),
        }
    }

    Err(TransportError::NoPortPair(addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn binds_consecutive_ports() {
        let transport = RtpTransport::bind(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            TransportTimeouts::default(),
        )
        .await
        .unwrap();

        let descriptors = transport.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].component, Component::Rtp);
        assert_eq!(descriptors[0].local_addr.port() % 2, 0);
        assert_eq!(
            descriptors[1].local_addr.port(),
            descriptors[0].local_addr.port() + 1
        );
    }

    #[tokio::test]
    async fn remove_unknown_destination() {
        let transport = RtpTransport::bind(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            TransportTimeouts::default(),
        )
        .await
        .unwrap();

        let remote = SocketAddr::from((Ipv4Addr::LOCALHOST, 40000));
        assert!(matches!(
            transport.remove_destination(remote),
            Err(TransportError::DestinationNotFound(_))
        ));

        transport.add_destination(remote);
        transport.remove_destination(remote).unwrap();
    }
}

//! One-shot ARP resolution
//!
//! Broadcasts a single request and takes the first ARP message the transport
//! delivers as the answer. The reply is not matched against the request, so
//! on a busy segment an unrelated ARP frame can win.

use tracing::{debug, info};

use crate::error::Result;
use crate::iface::address::{IpAddr, MacAddr};
use crate::iface::transport::{LinkTransport, Wait};
use crate::network::arp::{ArpMessage, ARP_MESSAGE_LEN};

/// Resolves peer hardware addresses on behalf of one local interface.
#[derive(Debug, Clone)]
pub struct ArpResolver {
    interface: String,
    local_mac: MacAddr,
    local_ip: IpAddr,
}

impl ArpResolver {
    pub fn new(interface: impl Into<String>, local_mac: MacAddr, local_ip: IpAddr) -> Self {
        ArpResolver {
            interface: interface.into(),
            local_mac,
            local_ip,
        }
    }

    /// Ask who has `remote_ip` and return the sender address of the reply.
    ///
    /// `transport` must be bound to the ARP ethertype.
    pub fn resolve<T: LinkTransport>(
        &self,
        transport: &mut T,
        remote_ip: IpAddr,
        wait: &Wait,
    ) -> Result<MacAddr> {
        let request = ArpMessage::request(self.local_mac, self.local_ip, remote_ip);
        transport.send(&self.interface, MacAddr::BROADCAST, &request.serialize())?;
        debug!(interface = %self.interface, %remote_ip, "arp request broadcast");

        let data = transport.recv(ARP_MESSAGE_LEN, wait)?;
        let reply = ArpMessage::parse(&data)?;
        if !reply.is_reply() || reply.sender_ip != remote_ip {
            debug!(
                operation = reply.operation,
                sender_ip = %reply.sender_ip,
                "accepting arp message that does not answer the request"
            );
        }

        info!(%remote_ip, mac = %reply.sender_mac, "resolved");
        Ok(reply.sender_mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::iface::testing::ScriptedTransport;
    use crate::network::arp::operation;

    fn resolver() -> ArpResolver {
        ArpResolver::new(
            "eth0",
            "aa:bb:cc:dd:ee:01".parse().unwrap(),
            "172.17.0.2".parse().unwrap(),
        )
    }

    #[test]
    fn test_resolve_sends_broadcast_request() {
        let resolver = resolver();
        let remote_ip: IpAddr = "172.17.0.3".parse().unwrap();
        let peer_mac: MacAddr = "aa:bb:cc:dd:ee:02".parse().unwrap();

        let request = ArpMessage::request(resolver.local_mac, resolver.local_ip, remote_ip);
        let mut transport = ScriptedTransport::new();
        transport.push_reply(ArpMessage::reply_to(&request, peer_mac).serialize().to_vec());

        let mac = resolver.resolve(&mut transport, remote_ip, &Wait::forever()).unwrap();
        assert_eq!(mac, peer_mac);

        assert_eq!(transport.sent.len(), 1);
        let (interface, dst, payload) = &transport.sent[0];
        assert_eq!(interface, "eth0");
        assert_eq!(*dst, MacAddr::BROADCAST);
        assert_eq!(payload, &request.serialize().to_vec());
        assert_eq!(transport.recv_limits, vec![ARP_MESSAGE_LEN]);
    }

    #[test]
    fn test_resolve_accepts_first_message_unconditionally() {
        let resolver = resolver();
        let stranger = ArpMessage {
            operation: operation::REQUEST,
            ..ArpMessage::request(
                "aa:bb:cc:dd:ee:09".parse().unwrap(),
                "172.17.0.9".parse().unwrap(),
                "172.17.0.1".parse().unwrap(),
            )
        };
        let mut transport = ScriptedTransport::new();
        transport.push_reply(stranger.serialize().to_vec());

        let mac = resolver
            .resolve(&mut transport, "172.17.0.3".parse().unwrap(), &Wait::forever())
            .unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:09");
    }

    #[test]
    fn test_resolve_times_out() {
        let mut transport = ScriptedTransport::new();
        let result = resolver().resolve(
            &mut transport,
            "172.17.0.3".parse().unwrap(),
            &Wait::timeout(std::time::Duration::from_millis(10)),
        );
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn test_resolve_short_reply() {
        let mut transport = ScriptedTransport::new();
        transport.push_reply(vec![0u8; 10]);
        let result = resolver().resolve(
            &mut transport,
            "172.17.0.3".parse().unwrap(),
            &Wait::forever(),
        );
        assert!(matches!(result, Err(Error::Truncated { needed: 28, actual: 10 })));
    }
}

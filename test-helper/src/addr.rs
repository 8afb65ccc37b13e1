use std::net::{SocketAddr, TcpListener, UdpSocket};

/// Gets a new socket address allocated by the OS.
pub fn get_unused_addr() -> SocketAddr {
    let socket = TcpListener::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap()
}

/// Gets an address whose port is currently free for both UDP and TCP.
pub fn get_unused_gossip_addr() -> SocketAddr {
    loop {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        if TcpListener::bind(addr).is_ok() {
            return addr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unused_addr() {
        let addr = get_unused_addr();
        TcpListener::bind(addr).expect("Connect to allocated address");
    }

    #[test]
    fn test_get_unused_gossip_addr() {
        let addr = get_unused_gossip_addr();
        UdpSocket::bind(addr).expect("Bind to allocated address");
    }
}

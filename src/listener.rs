use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use crate::worker::WorkerPool;


/// Something that takes ownership of freshly accepted connections
pub trait ConnectionListener {
    fn on_accept(&mut self, stream: TcpStream);
}

/// Blocking accept loop feeding a `WorkerPool`
pub struct Listener {
    socket: TcpListener,
    pool: WorkerPool,
}

impl Listener {
    pub fn bind<A: ToSocketAddrs>(addr: A, pool: WorkerPool)
        -> io::Result<Listener>
    {
        let socket = TcpListener::bind(addr)?;
        info!("Listening on {}", socket.local_addr()?);
        Ok(Listener {
            socket: socket,
            pool: pool,
        })
    }
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
    /// Accepts connections forever
    ///
    /// Accept errors are logged and the loop goes on.
    pub fn run(&mut self) {
        loop {
            match self.socket.accept() {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    self.on_accept(stream);
                }
                Err(e) => warn!("Can't accept connection: {}", e),
            }
        }
    }
    /// Stops the workers, the listening socket is closed on return
    pub fn shutdown(self) {
        self.pool.shutdown();
    }
}

impl ConnectionListener for Listener {
    fn on_accept(&mut self, stream: TcpStream) {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!("Can't make connection non-blocking: {}", e);
            return;
        }
        self.pool.dispatch(mio::net::TcpStream::from_std(stream));
    }
}

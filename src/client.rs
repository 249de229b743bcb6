//! Blocking IProto connection.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use rmpv::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::iproto::{self, Greeting, IteratorType, RequestCode};

/// A single connection to a Tarantool instance.
///
/// Requests are sent one at a time and each call waits for its response.
/// A request that times out before any byte of its reply arrived leaves the
/// stream aligned: the late reply is skipped by its sync id on the next
/// call. Any failure inside a packet drops the connection.
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    greeting: Greeting,
    sync: u64,
    closed: bool,
}

impl Connection {
    /// Connects to `addr` and reads the server greeting.
    pub fn connect(addr: &str, timeout: Option<Duration>) -> Result<Self> {
        let connect_err = |source| Error::Connect {
            addr: addr.to_string(),
            source,
        };

        let stream = match timeout {
            Some(t) => {
                let mut last_err = None;
                let mut connected = None;
                for sock in addr.to_socket_addrs().map_err(connect_err)? {
                    match TcpStream::connect_timeout(&sock, t) {
                        Ok(s) => {
                            connected = Some(s);
                            break;
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                match connected {
                    Some(s) => s,
                    None => {
                        return Err(connect_err(last_err.unwrap_or_else(|| {
                            io::Error::new(
                                io::ErrorKind::NotFound,
                                "address resolved to nothing",
                            )
                        })))
                    }
                }
            }
            None => TcpStream::connect(addr).map_err(connect_err)?,
        };
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        stream.set_nodelay(true)?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut buf = [0u8; iproto::GREETING_SIZE];
        reader.read_exact(&mut buf).map_err(connect_err)?;
        let greeting = iproto::parse_greeting(&buf)?;
        debug!(addr, version = %greeting.version, "connected");

        Ok(Connection {
            reader,
            writer: BufWriter::new(stream),
            greeting,
            sync: 0,
            closed: false,
        })
    }

    /// Server version line from the greeting.
    pub fn server_version(&self) -> &str {
        &self.greeting.version
    }

    /// Authenticates the session with chap-sha1.
    pub fn authenticate(&mut self, user: &str, password: &str) -> Result<()> {
        let scramble = iproto::scramble(&self.greeting.salt, password);
        self.request(RequestCode::Auth, iproto::auth_body(user, scramble))?;
        debug!(user, "authenticated");
        Ok(())
    }

    pub fn ping(&mut self) -> Result<()> {
        self.request(RequestCode::Ping, iproto::body(Vec::new()))?;
        Ok(())
    }

    /// Runs a select and returns the matching tuples.
    pub fn select(
        &mut self,
        space: u32,
        index: u32,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
        key: Vec<Value>,
    ) -> Result<Vec<Value>> {
        self.request(
            RequestCode::Select,
            iproto::select_body(space, index, limit, offset, iterator, key),
        )
    }

    /// Inserts or overwrites a whole tuple. Returns the stored tuple.
    pub fn replace(&mut self, space: u32, tuple: Vec<Value>) -> Result<Vec<Value>> {
        self.request(RequestCode::Replace, iproto::replace_body(space, tuple))
    }

    /// Deletes by key. Returns the deleted tuple, if there was one.
    pub fn delete(&mut self, space: u32, index: u32, key: Vec<Value>) -> Result<Vec<Value>> {
        self.request(RequestCode::Delete, iproto::delete_body(space, index, key))
    }

    /// Shuts the socket down. Further requests fail with `Error::Closed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.writer.flush() {
            debug!(error = %e, "flush on close failed");
        }
        match self.writer.get_ref().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already went away.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn request(&mut self, code: RequestCode, body: Value) -> Result<Vec<Value>> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.sync += 1;
        let sync = self.sync;

        let packet = iproto::encode_packet(&iproto::request_header(code, sync), &body)?;
        if let Err(e) = self.send(&packet) {
            return Err(self.abort(e));
        }

        loop {
            let response = match self.receive() {
                Ok(r) => r,
                // Nothing of the reply was consumed; it is skipped once it shows up.
                Err(Error::Timeout) => return Err(Error::Timeout),
                Err(e) => return Err(self.abort(e)),
            };
            if response.sync < sync {
                debug!(stale = response.sync, sync, "skipping late response");
                continue;
            }
            if response.sync > sync {
                let e = Error::Protocol(format!(
                    "response sync {} is ahead of request {}",
                    response.sync, sync
                ));
                return Err(self.abort(e));
            }
            return response.result;
        }
    }

    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.writer.write_all(packet)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Waits for the next packet. A timeout before its first byte is
    /// reported as `Error::Timeout` with the stream left intact.
    fn receive(&mut self) -> Result<iproto::Response> {
        match self.reader.fill_buf() {
            Ok(buf) if buf.is_empty() => return Err(Error::Closed),
            Ok(_) => {}
            Err(e) if is_timeout(&e) => return Err(Error::Timeout),
            Err(e) => return Err(e.into()),
        }
        let payload = iproto::read_packet(&mut self.reader)?;
        iproto::parse_response(&payload)
    }

    /// Drops a connection whose stream position is no longer known.
    fn abort(&mut self, e: Error) -> Error {
        debug!(error = %e, "dropping connection");
        let _ = self.close();
        match e {
            Error::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => Error::Closed,
            Error::Io(err) if is_timeout(&err) => Error::Timeout,
            other => other,
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

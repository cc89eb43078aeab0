//! # Transport Codec
//!
//! Frames messages on a raw TCP stream: a fixed header carrying the payload
//! length and an Adler-32 checksum, followed by a UTF-8 JSON payload encoding
//! `[serviceId, jobId, data]`. Job-direction frames (controller to worker)
//! are preceded by a 6-byte message tag; reply-direction frames are not.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use adler32::RollingAdler32;
use serde_json::Value;
use thiserror::Error;

/// Length of the message-type tag on job-direction frames.
pub const TAG_LEN: usize = 6;
/// Tag announcing a job frame (header and payload follow).
pub const JOB_TAG: &[u8; TAG_LEN] = b"JOB   ";
/// Bare tag requesting cancellation of the running batch; no payload.
pub const CANCEL_TAG: &[u8; TAG_LEN] = b"CANCEL";
/// Payload length (u32 BE) plus Adler-32 checksum (u32 BE).
pub const HEADER_LEN: usize = 8;
/// Version identifier sent by the worker immediately after connecting.
pub const PROTOCOL_IDENT: &[u8; 7] = b"Rust1.0";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("checksum mismatch: declared {declared:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { declared: u32, computed: u32 },
    #[error("truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("frame payload of {0} bytes exceeds the configured limit")]
    Oversize(u64),
    #[error("unknown message tag {0:?}")]
    UnknownTag([u8; TAG_LEN]),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A message read from the job direction of the stream.
#[derive(Debug)]
pub enum Incoming {
    Job {
        service: String,
        job: String,
        data: Value,
    },
    Cancel,
    /// Peer closed the connection at a frame boundary.
    Eof,
}

/// Adler-32 over the payload bytes, as declared in the frame header.
pub fn checksum(payload: &[u8]) -> u32 {
    RollingAdler32::from_buffer(payload).hash()
}

/// Both ends of the framed protocol over one TCP stream.
///
/// All I/O goes through `&TcpStream`, so a shared reference is enough to
/// send replies and poll for cancellation concurrently from the batch driver.
pub struct FrameStream {
    stream: TcpStream,
    max_payload: u64,
}

impl FrameStream {
    pub fn new(stream: TcpStream, max_payload: u64) -> Self {
        Self {
            stream,
            max_payload,
        }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Send the protocol version identifier. Called once, before any frame.
    pub fn send_ident(&self) -> Result<(), ProtocolError> {
        (&self.stream).write_all(PROTOCOL_IDENT)?;
        Ok(())
    }

    /// Read the peer's version identifier (controller side of the handshake).
    pub fn recv_ident(&self) -> Result<[u8; PROTOCOL_IDENT.len()], ProtocolError> {
        let mut ident = [0u8; PROTOCOL_IDENT.len()];
        (&self.stream).read_exact(&mut ident)?;
        Ok(ident)
    }

    /// Send a reply-direction frame: header and payload, no tag.
    pub fn send_reply(&self, service: &str, job: &str, data: &Value) -> Result<(), ProtocolError> {
        let buf = encode_frame(service, job, data)?;
        (&self.stream).write_all(&buf)?;
        Ok(())
    }

    /// Send a job-direction frame: tag, header, payload.
    pub fn send_job(&self, service: &str, job: &str, data: &Value) -> Result<(), ProtocolError> {
        let frame = encode_frame(service, job, data)?;
        let mut buf = Vec::with_capacity(TAG_LEN + frame.len());
        buf.extend_from_slice(JOB_TAG);
        buf.extend_from_slice(&frame);
        (&self.stream).write_all(&buf)?;
        Ok(())
    }

    /// Send a bare cancellation tag.
    pub fn send_cancel(&self) -> Result<(), ProtocolError> {
        (&self.stream).write_all(CANCEL_TAG)?;
        Ok(())
    }

    /// Blocking read of the next job-direction message.
    ///
    /// Returns `Incoming::Eof` when the peer closed the connection before the
    /// first tag byte; an EOF anywhere later is a `Truncated` error.
    pub fn recv_message(&self) -> Result<Incoming, ProtocolError> {
        let mut tag = [0u8; TAG_LEN];
        if !self.read_full_or_eof(&mut tag)? {
            return Ok(Incoming::Eof);
        }
        if &tag == CANCEL_TAG {
            return Ok(Incoming::Cancel);
        }
        if &tag != JOB_TAG {
            return Err(ProtocolError::UnknownTag(tag));
        }
        match self.recv_frame()? {
            Some((service, job, data)) => Ok(Incoming::Job { service, job, data }),
            None => Err(ProtocolError::Truncated {
                expected: HEADER_LEN,
                got: 0,
            }),
        }
    }

    /// Blocking read of one untagged frame (controller side).
    ///
    /// Returns `None` when the peer closed the connection at a frame boundary.
    pub fn recv_reply(&self) -> Result<Option<(String, String, Value)>, ProtocolError> {
        self.recv_frame()
    }

    /// Non-blocking peek for a pending `CANCEL` tag.
    ///
    /// Consumes the tag and returns true when one is waiting; leaves the
    /// stream untouched otherwise, so normal frame delivery is unaffected.
    pub fn poll_cancel(&self) -> Result<bool, ProtocolError> {
        self.stream.set_nonblocking(true)?;
        let mut tag = [0u8; TAG_LEN];
        let peeked = self.stream.peek(&mut tag);
        self.stream.set_nonblocking(false)?;
        match peeked {
            Ok(n) if n == TAG_LEN && &tag == CANCEL_TAG => {
                (&self.stream).read_exact(&mut tag)?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Orderly bidirectional shutdown.
    pub fn shutdown(&self) -> Result<(), ProtocolError> {
        self.stream.shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }

    fn recv_frame(&self) -> Result<Option<(String, String, Value)>, ProtocolError> {
        let mut header = [0u8; HEADER_LEN];
        if !self.read_full_or_eof(&mut header)? {
            return Ok(None);
        }
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let declared = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if u64::from(length) > self.max_payload {
            return Err(ProtocolError::Oversize(u64::from(length)));
        }

        let mut payload = vec![0u8; length as usize];
        if !self.read_full_or_eof(&mut payload)? {
            return Ok(None);
        }
        let computed = checksum(&payload);
        if computed != declared {
            return Err(ProtocolError::ChecksumMismatch { declared, computed });
        }

        let (service, job, data) = serde_json::from_slice(&payload)?;
        Ok(Some((service, job, data)))
    }

    /// Fill `buf` completely. Returns false if the peer closed before the
    /// first byte; EOF after a partial read is `Truncated`.
    fn read_full_or_eof(&self, buf: &mut [u8]) -> Result<bool, ProtocolError> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match (&self.stream).read(&mut buf[filled..]) {
                Ok(0) => {
                    if filled == 0 {
                        return Ok(false);
                    }
                    return Err(ProtocolError::Truncated {
                        expected: buf.len(),
                        got: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(true)
    }
}

/// Serialize `[service, job, data]` and prepend the length+checksum header.
fn encode_frame(service: &str, job: &str, data: &Value) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(&(service, job, data))?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&checksum(&payload).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

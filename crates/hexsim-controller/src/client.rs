//! A minimal client for the controller, used by tests and the command line tools.

use hexsim_protocol::{
    encode_record, Command, CommandStatus, Frame, FrameDecoder, Header, WireRecord,
    COMMAND_PARAM_COUNT,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::ClientError;

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 4096;

/// Client side of a controller connection, typed by the device's config and telemetry records.
pub struct ControllerClient<C, T> {
    stream: TcpStream,
    decoder: FrameDecoder<C, T>,
    counter: u32,
    read_buf: Box<[u8; READ_BUFFER_SIZE]>,
}

impl<C: WireRecord, T: WireRecord> ControllerClient<C, T> {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(ControllerClient {
            stream,
            decoder: FrameDecoder::new(),
            counter: 0,
            read_buf: Box::new([0u8; READ_BUFFER_SIZE]),
        })
    }

    /// Next command counter. Counters start at 1 and wrap.
    pub fn next_counter(&mut self) -> u32 {
        self.counter = self.counter.wrapping_add(1);
        self.counter
    }

    /// Write a command as-is, counter included.
    pub async fn write_command(&mut self, command: &Command) -> Result<(), ClientError> {
        self.stream.write_all(&encode_record(command)).await?;
        Ok(())
    }

    /// Write a command with the next counter. Returns the counter used.
    pub async fn send(
        &mut self,
        code: u32,
        params: [f64; COMMAND_PARAM_COUNT],
    ) -> Result<u32, ClientError> {
        let counter = self.next_counter();
        let command = Command::new(code, counter).with_params(params);
        debug!(code, counter, "sending command");
        self.write_command(&command).await?;
        Ok(counter)
    }

    /// Read the next frame of any kind.
    pub async fn next_frame(&mut self) -> Result<Frame<C, T>, ClientError> {
        loop {
            if let Some(frame) = self.decoder.decode()? {
                return Ok(frame);
            }
            let n = self.stream.read(&mut self.read_buf[..]).await?;
            if n == 0 {
                return Err(ClientError::Closed);
            }
            self.decoder.push(&self.read_buf[..n]);
        }
    }

    /// Skip frames until a command status arrives.
    pub async fn next_command_status(&mut self) -> Result<(Header, CommandStatus), ClientError> {
        loop {
            if let Frame::CommandStatus(header, status) = self.next_frame().await? {
                return Ok((header, status));
            }
        }
    }

    /// Skip frames until a config arrives.
    pub async fn next_config(&mut self) -> Result<(Header, C), ClientError> {
        loop {
            if let Frame::Config(header, config) = self.next_frame().await? {
                return Ok((header, config));
            }
        }
    }

    /// Skip frames until a telemetry record arrives.
    pub async fn next_telemetry(&mut self) -> Result<(Header, T), ClientError> {
        loop {
            if let Frame::Telemetry(header, telemetry) = self.next_frame().await? {
                return Ok((header, telemetry));
            }
        }
    }

    /// Send a command and wait for the status that echoes its counter.
    pub async fn run_command(
        &mut self,
        code: u32,
        params: [f64; COMMAND_PARAM_COUNT],
    ) -> Result<CommandStatus, ClientError> {
        let counter = self.send(code, params).await?;
        loop {
            let (header, status) = self.next_command_status().await?;
            if header.counter == counter {
                return Ok(status);
            }
            debug!(expected = counter, got = header.counter, "skipping stale command status");
        }
    }

    /// Shut down the write half and drop the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

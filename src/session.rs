//! One full connection per role: handshake, transfer, teardown.

use std::io;
use std::path::Path;

use crate::config::Config;
use crate::connection::ConnectionContext;
use crate::error::TransportError;
use crate::gbn_receiver::{self, DeliveryLog, ReceiveOutcome, ReceiveReport};
use crate::gbn_sender::{SendReport, SenderPipeline};
use crate::handshake;
use crate::simulator::FaultInjector;
use crate::socket::Channel;
use crate::state::ConnectionState;
use crate::teardown::{self, AcceptCloseOutcome, CloseOutcome};

/// Result of a completed sender session.
#[derive(Debug)]
pub struct SenderSession {
    pub context: ConnectionContext,
    pub report: SendReport,
    pub close: CloseOutcome,
}

/// Result of a completed receiver session.
#[derive(Debug)]
pub struct ReceiverSession {
    pub context: ConnectionContext,
    pub report: ReceiveReport,
    /// `None` when the peer went silent instead of closing.
    pub close: Option<AcceptCloseOutcome>,
}

/// Connect, send `data` reliably, then close.
pub async fn run_sender<C: Channel, F: FaultInjector>(
    channel: &C,
    config: &Config,
    data: &[u8],
    faults: F,
) -> Result<SenderSession, TransportError> {
    let mut ctx = handshake::connect(channel, config).await?;
    let report = SenderPipeline::new(channel, &mut ctx, config, faults, data)?
        .run()
        .await?;
    let close = teardown::close(channel, &mut ctx, config).await?;
    Ok(SenderSession {
        context: ctx,
        report,
        close,
    })
}

/// Accept one connection and deliver its stream to `sink`.
pub async fn run_receiver<C: Channel, L: DeliveryLog>(
    channel: &C,
    config: &Config,
    sink: L,
) -> Result<ReceiverSession, TransportError> {
    let mut ctx = handshake::accept(channel, config).await?;
    let report = gbn_receiver::receive(channel, &mut ctx, config.recv_timeout, sink).await?;
    let close = match report.outcome {
        ReceiveOutcome::PeerClosed { .. } => {
            Some(teardown::accept_close(channel, &mut ctx, config).await?)
        }
        ReceiveOutcome::Idle => {
            ctx.transition(ConnectionState::Closed);
            None
        }
    };
    Ok(ReceiverSession {
        context: ctx,
        report,
        close,
    })
}

/// Read the whole stream to send.  A missing file is an empty stream.
pub fn read_stream(path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("{} not found; sending an empty stream", path.display());
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

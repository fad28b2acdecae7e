use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::codec::{decode_op, read_frame};
use crate::error::Result;
use crate::link::PeerLink;
use crate::replica::SharedEngine;
use crate::transport::LinkState;

/// Read frames from `reader` and apply each operation until the stream ends, a frame fails to
/// read or decode, or the link is closed. Ending on its own marks the link disconnected.
pub(crate) async fn run<R>(mut reader: R, engine: SharedEngine, link: Arc<PeerLink>)
where
    R: AsyncRead + Send + Unpin,
{
    let mut state = link.subscribe();
    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader) => frame,
            _ = closed(&mut state) => break,
        };
        match frame {
            Ok(Some(frame)) => {
                if let Err(err) = apply_frame(&engine, link.peer(), &frame) {
                    warn!(peer = %link.peer(), %err, "undecodable frame, dropping peer");
                    link.mark_disconnected();
                    break;
                }
            }
            Ok(None) => {
                info!(peer = %link.peer(), "peer closed the stream");
                link.mark_disconnected();
                break;
            }
            Err(err) => {
                warn!(peer = %link.peer(), %err, "receive failed");
                link.mark_disconnected();
                break;
            }
        }
    }
    debug!(peer = %link.peer(), "receiver stopped");
}

async fn closed(state: &mut watch::Receiver<LinkState>) {
    let _ = state.wait_for(|s| *s == LinkState::Closed).await;
}

/// Fails only when the frame does not decode; rejected operations are logged and skipped.
fn apply_frame(engine: &SharedEngine, peer: &str, frame: &[u8]) -> Result<()> {
    let op = decode_op(frame)?;

    let mut engine = engine.lock();
    // An echo of our own operation would be treated as a fresh local op and re-published.
    if op.replica == engine.replica_id() {
        warn!(%peer, timestamp = op.timestamp, "dropping echoed local operation");
        return Ok(());
    }
    let (timestamp, replica) = op.key();
    match engine.apply(op) {
        Ok(delta) => debug!(
            %peer,
            %replica,
            timestamp,
            index = delta.index,
            reverted = delta.reverted,
            ignored = delta.ignored,
            "applied remote operation"
        ),
        Err(err) => warn!(%peer, %replica, timestamp, %err, "rejected remote operation"),
    }
    Ok(())
}

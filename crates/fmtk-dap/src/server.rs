use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use fmtk_config::SessionConfig;

use crate::{
    dap_tokio::{DapError, DapReader, DapWriter},
    session::{Launcher, Outbox, ProcessLauncher, Session, SessionInput},
};

/// Serve one debug session over stdio, launching the real game.
pub async fn run_stdio(config: SessionConfig) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    run(stdin, stdout, config, Box::new(ProcessLauncher))
        .await
        .map_err(anyhow::Error::from)
}

/// Serve one debug session: requests are read from `reader`, responses and
/// events are written to `writer`. Returns once the editor closes its side.
pub async fn run<R, W>(
    reader: R,
    writer: W,
    config: SessionConfig,
    launcher: Box<dyn Launcher>,
) -> Result<(), DapError>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(async move {
        let mut writer = DapWriter::new(writer);
        while let Some(msg) = out_rx.recv().await {
            if let Err(err) = writer.write_value(&msg).await {
                warn!(error = %err, "failed to write DAP message");
                break;
            }
        }
    });

    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let session = Session::new(config, Outbox::new(out_tx), inbox_tx.clone(), launcher);
    let session_task = tokio::spawn(session.run(inbox_rx));

    let mut reader = DapReader::new(reader);
    let result = loop {
        match reader.read_request().await {
            Ok(Some(request)) => {
                if inbox_tx.send(SessionInput::Request(request)).is_err() {
                    break Ok(());
                }
            }
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        }
    };

    debug!("client closed the DAP stream");
    let _ = inbox_tx.send(SessionInput::ClientClosed);
    drop(inbox_tx);
    let _ = session_task.await;
    let _ = writer_task.await;
    result
}

//! Live connection server.
//!
//! One task per connection. Inbound frames are processed one at a time to
//! completion; outbound frames produced by the session are drained from a
//! channel by the same task, so the socket is only ever touched there.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, info_span, warn};

use crate::app::App;
use crate::error::BoxError;
use crate::protocol::Frame;
use crate::session::ChannelTransport;
use crate::watch;

pub struct Server {
    app: Arc<App>,
}

impl Server {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Bind the configured address and serve until the process stops. In
    /// development mode the app root is watched as well.
    pub async fn run(&self) -> Result<(), BoxError> {
        if self.app.config().dev_mode {
            let app = self.app.clone();
            tokio::spawn(async move {
                if let Err(e) = watch::watch(app).await {
                    error!("file watcher error: {}", e);
                }
            });
        }

        let listener = TcpListener::bind(self.app.config().addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        info!(addr = %listener.local_addr()?, "live server listening");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "new connection");
                    let app = self.app.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, app).await {
                            warn!("connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Drive one live connection against its durable session.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    app: Arc<App>,
) -> Result<(), BoxError> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let (transport, mut outbound) = ChannelTransport::pair();
    let session = app.sessions().open(Arc::new(transport));
    let span = info_span!("session", id = %session.id(), %addr);

    let result: Result<(), BoxError> = async {
        loop {
            tokio::select! {
                msg = read.next() => {
                    let frame = match msg {
                        Some(Ok(Message::Text(text))) => Frame::Text(text),
                        Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes),
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            span.in_scope(|| warn!(error = %e, "read failed"));
                            break;
                        }
                    };

                    span.in_scope(|| {
                        if let Err(error) = app.handle_frame(&session, &frame) {
                            warn!(%error, "message dropped");
                        }
                    });
                }

                frame = outbound.recv() => {
                    let message = match frame {
                        Some(Frame::Text(text)) => Message::Text(text),
                        Some(Frame::Binary(bytes)) => Message::Binary(bytes),
                        None => break,
                    };
                    write.send(message).await?;
                }
            }
        }
        Ok(())
    }
    .await;

    app.sessions().close(&session.id());
    span.in_scope(|| info!("connection closed"));
    result
}

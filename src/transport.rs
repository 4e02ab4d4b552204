//! Thin contract over a WebSocket carrier, and the real adapter over
//! `tokio-tungstenite`.
//!
//! The transport is treated as an external collaborator: it offers
//! send/recv-text and recv-frame primitives only. Everything about the HPQ
//! request/response protocol lives in [`crate::protocol`].

use std::sync::Arc;

use futures_util::stream::{Peekable, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::Error;
use crate::record::Frame;

/// Send text, receive text, and receive the next binary frame with its FIN
/// bit. Implementations are not expected to interpret frame contents.
pub trait Transport {
    /// Send `text` as a text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), Error>;

    /// Receive the next text frame, transparently answering pings.
    async fn recv_text(&mut self) -> Result<String, Error>;

    /// Receive the next binary frame.
    async fn recv_frame(&mut self) -> Result<Frame, Error>;
}

type TungsteniteStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Real transport backed by a live WebSocket connection.
///
/// Split into sink/stream halves (as `rt_test_utils::MockWsClient` does) so
/// that `recv_frame` can peek one message ahead: a body frame's FIN is
/// derived from whether the *next* message on the wire is itself binary.
/// The HPQ body is always immediately followed by a control (text) message,
/// so "the next message isn't binary" is an exact stand-in for the
/// WebSocket-level FIN bit on the last fragment of the body.
pub struct WsTransport {
    write: SplitSink<TungsteniteStream, Message>,
    read: Peekable<SplitStream<TungsteniteStream>>,
}

impl WsTransport {
    /// Connect to `url`, sending `authorization` as the handshake
    /// `Authorization` header. `insecure` disables TLS certificate
    /// verification (staging profile only — never set for production).
    pub async fn connect(url: &str, authorization: &str, insecure: bool) -> Result<Self, Error> {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;

        let mut request = url
            .into_client_request()
            .map_err(|e| Error::Transport(format!("invalid URL '{url}': {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            authorization
                .parse()
                .map_err(|e| Error::Transport(format!("invalid auth header: {e}")))?,
        );

        let connector = if insecure {
            Some(tokio_tungstenite::Connector::Rustls(Arc::new(
                insecure_rustls_config(),
            )))
        } else {
            None
        };

        let (ws, _response) = tokio_tungstenite::connect_async_tls_with_config(
            request, None, false, connector,
        )
        .await
        .map_err(|e| Error::Transport(format!("connect failed: {e}")))?;

        let (write, read) = ws.split();
        Ok(Self {
            write,
            read: read.peekable(),
        })
    }
}

impl Transport for WsTransport {
    async fn send_text(&mut self, text: &str) -> Result<(), Error> {
        self.write
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn recv_text(&mut self) -> Result<String, Error> {
        loop {
            match self.read.next().await {
                None => return Err(Error::Transport("connection closed".to_owned())),
                Some(Err(e)) => return Err(Error::Transport(e.to_string())),
                Some(Ok(Message::Text(t))) => return Ok(t.to_string()),
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    return Err(Error::Transport("connection closed".to_owned()));
                }
                Some(Ok(other)) => {
                    debug!(?other, "ignoring non-text frame while expecting control message");
                }
            }
        }
    }

    async fn recv_frame(&mut self) -> Result<Frame, Error> {
        loop {
            match self.read.next().await {
                None => return Err(Error::Transport("connection closed".to_owned())),
                Some(Err(e)) => return Err(Error::Transport(e.to_string())),
                Some(Ok(Message::Binary(data))) => {
                    let next_is_binary = matches!(
                        std::pin::Pin::new(&mut self.read).peek().await,
                        Some(Ok(Message::Binary(_)))
                    );
                    return Ok(Frame {
                        data: data.to_vec(),
                        fin: !next_is_binary,
                    });
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    return Err(Error::Transport("connection closed".to_owned()));
                }
                Some(Ok(other)) => {
                    debug!(?other, "ignoring non-binary frame while expecting body frame");
                }
            }
        }
    }
}

fn insecure_rustls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
        .with_no_client_auth()
}

/// Accepts any server certificate. Only ever wired up for the staging
/// profile; never use against production.
#[derive(Debug)]
struct NoCertificateVerification;

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

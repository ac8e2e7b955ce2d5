use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;

use crate::error::{Error, Result};
use crate::unix_socket;

/// Thin HTTP/1.1 client over the control socket, used by the CLI front-end.
pub struct Client {
    socket: String,
}

impl Client {
    pub fn new(socket: impl Into<String>) -> Self {
        Self { socket: socket.into() }
    }

    async fn send(&self, method: Method, path: &str) -> Result<(hyper::StatusCode, String)> {
        let stream = unix_socket::connect(&self.socket).await?;
        let io = TokioIo::new(stream);
        let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!(e)))?;
        tokio::spawn(async move {
            let _ = connection.await;
        });

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost")
            .body(Empty::<Bytes>::new().boxed())
            .map_err(|e| Error::Other(anyhow::anyhow!(e)))?;

        let response = sender.send_request(request).await.map_err(|_| Error::NotReady)?;
        let status = response.status();
        let body = response.into_body().collect().await.map_err(|e| Error::Other(anyhow::anyhow!(e)))?;
        let text = String::from_utf8_lossy(&body.to_bytes()).into_owned();
        Ok((status, text))
    }

    /// `GET /ready`: returns [`Error::NotReady`] unless the daemon responds
    /// `200`.
    pub async fn ready(&self) -> Result<()> {
        let (status, _) = self.send(Method::GET, "/ready").await?;
        if status == hyper::StatusCode::OK {
            Ok(())
        } else {
            Err(Error::NotReady)
        }
    }

    pub async fn status(&self) -> Result<String> {
        let (_, body) = self.send(Method::GET, "/status").await?;
        Ok(body)
    }

    pub async fn logfile(&self) -> Result<String> {
        let (_, body) = self.send(Method::GET, "/logfile").await?;
        Ok(body)
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Method::DELETE, "/stop").await?;
        Ok(())
    }
}

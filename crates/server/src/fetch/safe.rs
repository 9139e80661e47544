use super::{DocumentFetcher, FetchRequest, FetchedDocument, is_public_ip, shared_tls_config};
use crate::config::{FetcherConfig, IpNet};
use crate::error::FetchError;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, LengthLimitError, Limited};
use hickory_resolver::{Resolver, name_server::ConnectionProvider};
use hyper::{Method, Request, header};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::{Host, Url};

/// HTTP/1.1 client that only talks to public addresses.
///
/// The host is resolved once, every resolved address is checked, and the
/// connection is made to a checked address directly so a second DNS answer
/// cannot redirect it. Redirects are not followed.
pub struct SafeFetcher<P: ConnectionProvider> {
    resolver: Resolver<P>,
    tls: Arc<ClientConfig>,
    timeout: Duration,
    allow_private_networks: bool,
    denied_nets: Vec<IpNet>,
    user_agent: String,
}

impl<P: ConnectionProvider> SafeFetcher<P> {
    pub fn new(resolver: Resolver<P>, config: &FetcherConfig) -> Result<Self, FetchError> {
        if config.allow_private_networks {
            tracing::warn!("fetcher allows private network destinations");
        }
        Ok(Self {
            resolver,
            tls: shared_tls_config().map_err(|e| FetchError::Tls(e.to_string()))?,
            timeout: config.timeout(),
            allow_private_networks: config.allow_private_networks,
            denied_nets: config.denied_nets.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    fn check_address(&self, ip: &IpAddr) -> Result<(), FetchError> {
        let denied = self.denied_nets.iter().any(|net| net.contains(ip));
        if denied || (!self.allow_private_networks && !is_public_ip(ip)) {
            return Err(FetchError::NonPublicAddress(*ip));
        }
        Ok(())
    }

    async fn resolve(&self, host: &Host<&str>) -> Result<Vec<IpAddr>, FetchError> {
        let addrs = match host {
            Host::Ipv4(v4) => vec![IpAddr::V4(*v4)],
            Host::Ipv6(v6) => vec![IpAddr::V6(*v6)],
            Host::Domain(name) => self
                .resolver
                .lookup_ip(*name)
                .await
                .map_err(|e| FetchError::Dns(e.to_string()))?
                .iter()
                .collect(),
        };
        if addrs.is_empty() {
            return Err(FetchError::NoAddresses);
        }
        // Every candidate must pass, not just the one we end up using.
        for ip in &addrs {
            self.check_address(ip)?;
        }
        Ok(addrs)
    }

    async fn fetch_inner(&self, request: &FetchRequest) -> Result<FetchedDocument, FetchError> {
        let url = Url::parse(&request.url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        match url.scheme() {
            "https" => {}
            "http" if !request.require_https => {}
            other => return Err(FetchError::SchemeNotAllowed(other.to_string())),
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(FetchError::InvalidUrl("credentials in URL".to_string()));
        }
        let host = url
            .host()
            .ok_or_else(|| FetchError::InvalidUrl("missing host".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| FetchError::InvalidUrl("missing port".to_string()))?;

        let addrs = self.resolve(&host).await?;
        let stream = connect_any(&addrs, port).await?;

        let host_header = match url.port() {
            Some(p) => format!("{}:{p}", url.host_str().unwrap_or_default()),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        let req = Request::builder()
            .method(Method::GET)
            .uri(&url[url::Position::BeforePath..url::Position::AfterQuery])
            .header(header::HOST, host_header)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, request.accept)
            .body(Empty::<Bytes>::new())
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if url.scheme() == "https" {
            let server_name = match host {
                Host::Domain(name) => ServerName::try_from(name.to_string())
                    .map_err(|e| FetchError::Tls(e.to_string()))?,
                Host::Ipv4(v4) => ServerName::IpAddress(IpAddr::V4(v4).into()),
                Host::Ipv6(v6) => ServerName::IpAddress(IpAddr::V6(v6).into()),
            };
            let tls_stream = TlsConnector::from(self.tls.clone())
                .connect(server_name, stream)
                .await
                .map_err(|e| FetchError::Tls(e.to_string()))?;
            exchange(tls_stream, req, request.max_body_bytes).await
        } else {
            exchange(stream, req, request.max_body_bytes).await
        }
    }
}

#[async_trait]
impl<P: ConnectionProvider> DocumentFetcher for SafeFetcher<P> {
    #[tracing::instrument(level = "debug", skip(self), fields(url = %request.url))]
    async fn fetch(&self, request: FetchRequest) -> Result<FetchedDocument, FetchError> {
        let result = tokio::time::timeout(self.timeout, self.fetch_inner(&request))
            .await
            .unwrap_or(Err(FetchError::Timeout(self.timeout)));
        if let Err(e) = &result {
            debug!(error = %e, "fetch failed");
        }
        result
    }
}

async fn connect_any(addrs: &[IpAddr], port: u16) -> Result<TcpStream, FetchError> {
    let mut last_err = FetchError::NoAddresses;
    for ip in addrs {
        match TcpStream::connect(SocketAddr::new(*ip, port)).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%ip, error = %e, "connect failed");
                last_err = FetchError::Network(e.to_string());
            }
        }
    }
    Err(last_err)
}

/// Aborts the connection driver when the fetch is dropped, so cancelling the
/// caller also tears down the outbound connection.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn exchange<S>(
    stream: S,
    req: Request<Empty<Bytes>>,
    max_body_bytes: usize,
) -> Result<FetchedDocument, FetchError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;
    let _driver = AbortOnDrop(tokio::spawn(async move {
        if let Err(err) = conn.await {
            debug!("connection closed with error: {err}");
        }
    }));

    let res = sender
        .send_request(req)
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;

    if !res.status().is_success() {
        return Err(FetchError::Status(res.status()));
    }

    let declared_len = res
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > max_body_bytes) {
        return Err(FetchError::BodyTooLarge(max_body_bytes));
    }

    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = Limited::new(res.into_body(), max_body_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                FetchError::BodyTooLarge(max_body_bytes)
            } else {
                FetchError::Network(e.to_string())
            }
        })?
        .to_bytes();

    Ok(FetchedDocument { content_type, body })
}

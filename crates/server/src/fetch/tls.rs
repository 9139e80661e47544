use once_cell::sync::OnceCell;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;

static TLS_CONFIG: OnceCell<Arc<ClientConfig>> = OnceCell::new();

/// Shared client TLS configuration with the webpki root store.
///
/// Built once with an explicit provider so it does not depend on a process
/// default having been installed.
pub fn shared_tls_config() -> Result<Arc<ClientConfig>, rustls::Error> {
    TLS_CONFIG
        .get_or_try_init(|| {
            let mut root_cert_store = RootCertStore::empty();
            root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let mut config = ClientConfig::builder_with_provider(Arc::new(
                rustls::crypto::aws_lc_rs::default_provider(),
            ))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();
            config.alpn_protocols = vec![b"http/1.1".to_vec()];

            Ok(Arc::new(config))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_tls_config() {
        let config1 = shared_tls_config().unwrap();
        let config2 = shared_tls_config().unwrap();
        assert!(Arc::ptr_eq(&config1, &config2));
        assert_eq!(config1.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }
}

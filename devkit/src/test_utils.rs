/*!
Utilitaires de test partagés

- logging tracing pour les tests (idempotent)
- adresse locale garantie sans écoute, pour simuler un hôte injoignable
*/

use std::net::TcpListener;

/// Installe un subscriber tracing si aucun n'est déjà actif (RUST_LOG respecté).
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `127.0.0.1:<port>` où plus rien n'écoute : toute connexion est refusée.
pub fn closed_address() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_address_refuses_connections() {
        let addr = closed_address().unwrap();
        assert!(std::net::TcpStream::connect(&addr).is_err());
    }

    #[test]
    fn test_logging_init_is_idempotent() {
        init_test_logging();
        init_test_logging();
    }
}

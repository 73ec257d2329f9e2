use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::net::TcpListener;
use tracing::{info, warn};

use fanpilot_common::{Backoff, Connectivity};

#[derive(Debug, Clone, Default)]
pub struct Reachability(Arc<AtomicBool>);

impl Reachability {
    pub fn set(&self, reachable: bool) {
        self.0.store(reachable, Ordering::Relaxed);
    }
}

impl Connectivity for Reachability {
    fn is_reachable(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Binds `addr`, retrying forever with `backoff` between attempts.
pub async fn bind_with_backoff(
    addr: SocketAddr,
    backoff: &mut Backoff,
    reachability: &Reachability,
) -> TcpListener {
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                backoff.reset();
                reachability.set(true);
                info!("listening on {addr}");
                return listener;
            }
            Err(err) => {
                reachability.set(false);
                let delay = backoff.next_delay();
                warn!("failed to bind {addr}: {err}, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

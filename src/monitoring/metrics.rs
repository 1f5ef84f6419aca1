use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use tracing::info;

static EXPORTER: OnceCell<SocketAddr> = OnceCell::new();
static PROMETHEUS_ENABLED: AtomicBool = AtomicBool::new(false);

/// 每个进程只安装一次 Prometheus HTTP exporter。
pub fn try_init_prometheus(listen: &str) -> Result<()> {
    let addr = EXPORTER.get_or_try_init(|| {
        let addr: SocketAddr = listen
            .parse()
            .with_context(|| format!("invalid prometheus listen address: {listen}"))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("安装 prometheus exporter 失败")?;
        PROMETHEUS_ENABLED.store(true, Ordering::Relaxed);
        Ok::<_, anyhow::Error>(addr)
    })?;
    info!(target: "monitoring::metrics", listen = %addr, "prometheus exporter 已监听");
    Ok(())
}

pub fn prometheus_enabled() -> bool {
    PROMETHEUS_ENABLED.load(Ordering::Relaxed)
}

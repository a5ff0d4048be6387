use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use common::DeviceTier;
use viewer_engine::app::ViewerEngine;
use viewer_engine::config::AppConfig;
use viewer_engine::mock_server::{MockSessionServer, MockStreamingClientFactory};
use viewer_engine::tuning::StaticCapabilityProbe;
use viewer_engine::types::{FailureEvent, FailureKind};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = match args.iter().position(|a| a == "--config") {
        Some(idx) => {
            let path = args
                .get(idx + 1)
                .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
            AppConfig::load_from_file(path)?
        }
        None => AppConfig::default(),
    };

    println!("🎥 CCTV viewer engine");
    println!("   heartbeat interval : {:?}", config.heartbeat.interval);
    println!("   max sessions       : {}", config.heartbeat.max_sessions);
    println!("   retry budget       : {}", config.recovery.max_retries);
    println!();

    // 平台后端与流媒体客户端在浏览器环境外以模拟实现代替
    let server = Arc::new(MockSessionServer::new());
    let factory = Arc::new(MockStreamingClientFactory::new());

    let engine = ViewerEngine::builder()
        .with_config(config)
        .with_endpoint(server.clone())
        .with_probe(Arc::new(StaticCapabilityProbe::new(
            DeviceTier::Medium,
            false,
        )))
        .with_factory(factory.clone())
        .build()?;

    if args.iter().any(|a| a == "--demo") {
        run_demo(&engine, &server, &factory).await?;
    } else {
        info!("No --demo flag given, engine assembled and idle");
    }

    engine.shutdown().await;
    Ok(())
}

/// 演示：打开两路播放，注入网络与媒体故障，观察恢复与心跳
async fn run_demo(
    engine: &ViewerEngine,
    server: &Arc<MockSessionServer>,
    factory: &Arc<MockStreamingClientFactory>,
) -> Result<()> {
    info!("Starting demo with two cameras...");

    let front_gate = engine.create_playback("camera-front-gate").await?;
    let car_park = engine.create_playback("camera-car-park").await?;
    info!(
        "✓ Playbacks open (sessions {} and {})",
        front_gate.session_id(),
        car_park.session_id()
    );

    // 让共享心跳任务跑几轮
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Heartbeats delivered so far: {}", server.total_heartbeats().await);

    // 注入一次致命网络故障：应触发退避重载
    info!("Injecting a fatal network failure on the front gate camera...");
    front_gate
        .failure_sender()
        .send(FailureEvent::fatal(FailureKind::Network))
        .map_err(|_| anyhow::anyhow!("failure mailbox closed"))?;
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    info!(
        "Stream reloads issued: {}",
        factory.client().reload_calls()
    );

    // 注入一次致命媒体故障：应原地修复
    info!("Injecting a fatal media failure on the car park camera...");
    car_park
        .failure_sender()
        .send(FailureEvent::fatal(FailureKind::Media))
        .map_err(|_| anyhow::anyhow!("failure mailbox closed"))?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("Repair attempts: {}", factory.client().repair_calls());

    // 模拟标签页隐藏：立即补发一轮心跳
    engine.on_visibility_hidden().await;

    front_gate.shutdown().await;
    car_park.shutdown().await;

    if server.active_session_count().await > 0 {
        warn!("Demo left sessions active on the mock server");
    }
    info!("✅ Demo finished");
    Ok(())
}

fn print_usage() {
    println!("viewer-engine - client-side resilience engine for live CCTV viewing");
    println!();
    println!("USAGE:");
    println!("    viewer-engine [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>   Load TOML configuration from <path>");
    println!("    --demo            Run the built-in two-camera demo");
    println!("    --help            Show this help");
}

use anyhow::Context;
use signing_core::config::Config;
use signing_core::log_info;
use signing_core::startup::Application;
use signing_core::utils::logger::init_logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 可选
    dotenvy::dotenv().ok();

    // 初始化日志（全局只需调用一次）
    init_logger();

    log_info!("Starting signing core initialization...");

    // 1. 加载配置
    let config = Config::load().context("Failed to load application configuration")?;
    config
        .validate()
        .context("Invalid application configuration")?;

    // 2. 构建应用实例（组装协作方与签名后端）
    let application = Application::build(config)
        .await
        .context("Application building failed (provider / MPC client initialization)")?;

    log_info!("Application build complete. Serving requests.");

    // 3. 读取 stdin 直到 EOF 或 Ctrl+C
    application
        .run()
        .await
        .context("Signing core failed during runtime")?;

    Ok(())
}

use tm_leverage::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    tm_leverage::init_tracing(config.log_format);

    if let Err(e) = tm_leverage::run(config).await {
        tracing::error!(error = %e, "tm_leverage exited with error");
        std::process::exit(1);
    }
}

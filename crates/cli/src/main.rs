use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn main() {
    let env_filter =
        EnvFilter::builder().with_default_directive(LevelFilter::WARN.into()).from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    if let Err(error) = pdf_render_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

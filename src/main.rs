use std::io::Write;
use std::sync::Arc;

use tracing::info;

use antecedentes_scout::batch;
use antecedentes_scout::browser::CdpDriverFactory;
use antecedentes_scout::captcha::{CaptchaResolver, TwoCaptcha};
use antecedentes_scout::core::config::AppConfig;
use antecedentes_scout::query::{Orchestrator, StdinConsole};

/// Non-flag CLI arguments are taken as the batch, joined so both
/// `antecedentes-scout 123,456` and `antecedentes-scout 123 456` work.
fn batch_from_args() -> Option<String> {
    let args: Vec<String> = std::env::args()
        .skip(1)
        .filter(|a| !a.starts_with("--"))
        .collect();
    if args.is_empty() {
        None
    } else {
        Some(args.join(","))
    }
}

fn prompt_for_batch() -> anyhow::Result<String> {
    print!("Enter one or more ID numbers separated by commas: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cfg = AppConfig::load();

    let input = match batch_from_args() {
        Some(batch) => batch,
        None => prompt_for_batch()?,
    };
    let cedulas = batch::parse_batch(&input);
    if cedulas.is_empty() {
        println!("No valid identifiers supplied. Exiting.");
        return Ok(());
    }

    let resolver: Option<Arc<dyn CaptchaResolver>> = match cfg.captcha_api_key.clone() {
        Some(key) => {
            info!("2captcha credential configured, automated captcha resolution enabled");
            Some(Arc::new(TwoCaptcha::new(key)?))
        }
        None => {
            info!("no usable 2captcha credential, captcha resolution will be manual");
            None
        }
    };

    let factory = Arc::new(CdpDriverFactory::from_config(&cfg));
    let orchestrator = Orchestrator::new(cfg, factory, resolver, Arc::new(StdinConsole));

    batch::run_batch(&orchestrator, &cedulas).await;
    Ok(())
}

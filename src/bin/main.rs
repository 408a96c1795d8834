use dialogue_agent::{
    agent::{FlowKind, Orchestrator},
    config::AppConfig,
    dialogue::{advance, Flow},
    models::ConversationState,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: agent chat [assistant|order]\n       agent analyze TICKER1,TICKER2 [period]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so the conversation stays readable on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("chat") => {
            let kind = match args.get(1) {
                Some(raw) => raw.parse::<FlowKind>()?,
                None => FlowKind::default(),
            };
            info!(flow = ?kind, "Starting chat");
            match kind {
                FlowKind::Assistant => chat(orchestrator.assistant()).await,
                FlowKind::Order => chat(orchestrator.order()).await,
            }
        }
        Some("analyze") => {
            let Some(list) = args.get(1) else {
                eprintln!("{}", USAGE);
                std::process::exit(2);
            };
            let tickers: Vec<String> = list.split(',').map(str::to_string).collect();
            let period = args.get(2).map(String::as_str).unwrap_or("1y");
            analyze(&orchestrator, &tickers, period).await
        }
        Some(_) => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

/// Terminal REPL: one turn per line until the conversation ends or stdin closes.
async fn chat<F: Flow>(flow: &F) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = advance(flow, ConversationState::<F::Stage, F::Data>::new(), "").await;
    println!("🤖 {}", state.last_response);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nVocê: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!("\nEncerrando o agente. Até logo!");
            break;
        };

        state = advance(flow, state, &line).await;
        println!("\n🔎 Agente: {}", state.last_response);

        if state.terminated {
            println!("\nConversa encerrada.");
            break;
        }
    }

    Ok(())
}

async fn analyze(
    orchestrator: &Orchestrator,
    tickers: &[String],
    period: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = orchestrator.analyze_tickers("cli", tickers, period).await?;

    println!("\n=== RANKING ({}) ===", report.period);
    for (i, entry) in report.ranking.iter().enumerate() {
        if entry.available {
            println!("  {}. {:<8} {:>6.2}%  {}", i + 1, entry.ticker_id, entry.score, entry.label);
        } else {
            println!("  {}. {:<8}     —    {}", i + 1, entry.ticker_id, entry.label);
        }
    }

    println!("\n{}", report.commentary);

    match &report.report_path {
        Some(path) => println!("\nRelatório: {}", path.display()),
        None => println!("\nRelatório não gerado."),
    }

    Ok(())
}

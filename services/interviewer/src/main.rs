use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lune_core::generator::OpenAiReportClient;
use lune_core::prompts::Prompts;
use lune_core::session_state::{Input, InputMode, InterviewSession};
use lune_interviewer::channel::OpenAiChannel;
use lune_interviewer::config::Config;
use lune_interviewer::console::{self, HELP};
use lune_interviewer::finalize::FinalizeClient;
use lune_interviewer::mcp::InterviewMcpServer;
use lune_interviewer::voice::{self, Devices};
use lune_interviewer::{EndedInterview, Runtime};
use openai_realtime::types::Session;
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Voice,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interview tools over MCP on stdio
    Mcp,
}

#[derive(Parser)]
#[command(version, about = "Runs one realtime interview and hands the transcript on for reporting")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// How the participant answers
    #[arg(long, value_enum, default_value_t = Mode::Voice)]
    mode: Mode,

    /// Export the transcript but skip report generation
    #[arg(long)]
    no_finalize: bool,

    #[arg(long)]
    input_device: Option<String>,

    #[arg(long)]
    output_device: Option<String>,

    /// Print the available audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn init_tracing(to_stderr: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(ChronoLocal::rfc_3339());
    // stdout carries the MCP protocol.
    if to_stderr {
        builder.with_writer(std::io::stderr).init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.command.is_some());

    if cli.list_devices {
        println!("{}", voice::describe_devices()?);
        return Ok(());
    }

    let config = Config::from_env().context("Failed to load application configuration")?;
    let prompts = Prompts::load_or_default(&config.prompts_dir);

    match cli.command {
        Some(Commands::Mcp) => serve_mcp(config, prompts).await,
        None => run_interview(&cli, config, prompts).await,
    }
}

async fn serve_mcp(config: Config, prompts: Prompts) -> Result<()> {
    let generator = Arc::new(OpenAiReportClient::new(
        Some(config.openai_api_key.clone()),
        prompts.report.clone(),
        config.reasoning_effort,
    ));
    let server = InterviewMcpServer::new(
        prompts,
        generator,
        &config.report_model,
        &config.report_fallback_model,
    );

    tracing::info!("Serving interview tools over stdio");
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("Failed to start MCP server")?;
    service.waiting().await?;
    Ok(())
}

async fn run_interview(cli: &Cli, config: Config, prompts: Prompts) -> Result<()> {
    let mode = match cli.mode {
        Mode::Voice => InputMode::Voice,
        Mode::Text => InputMode::Text,
    };

    let session = Session::new()
        .with_model(&config.realtime_model)
        .with_voice(config.voice.clone())
        .build();
    let channel = OpenAiChannel::new(config.openai_api_key.clone(), session, &config.realtime_model);
    let interview = InterviewSession::new(config.interview_config(&prompts));
    let mut runtime = Runtime::new(interview, channel, &config.transcript_dir).with_mode(mode);

    // Streams must stay alive for the whole interview.
    let _voice = match mode {
        InputMode::Voice => {
            let devices = Devices {
                input: cli.input_device.clone(),
                output: cli.output_device.clone(),
            };
            let (io, playback) = voice::start(devices, runtime.mic_gate(), runtime.outbound())?;
            runtime = runtime.with_playback(playback);
            Some(io)
        }
        InputMode::Text => None,
    };

    let handle = runtime.handle();
    console::spawn_stdin_reader(handle.clone()).context("Failed to read stdin")?;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, ending the interview...");
            if let Err(e) = handle.send(Input::Stop).await {
                tracing::debug!("{}", e);
            }
        }
    });

    tracing::info!("Starting interview in {:?} mode. {}", mode, HELP);
    let ended = runtime.run().await?;

    if cli.no_finalize {
        tracing::info!("Finalize skipped, {} transcript(s) exported", ended.len());
        return Ok(());
    }
    let client = FinalizeClient::new(&config.api_base_url);
    for interview in &ended {
        finalize(&client, interview).await;
    }
    Ok(())
}

async fn finalize(client: &FinalizeClient, interview: &EndedInterview) {
    if interview.turns.is_empty() {
        tracing::info!(interview_id = %interview.interview_id, "nothing was said, finalize skipped");
        return;
    }
    match client.finalize(&interview.interview_id, &interview.turns).await {
        Ok(body) => {
            let summary = body
                .pointer("/report_final/exec_summary/bullets")
                .and_then(|bullets| bullets.as_array())
                .map(|bullets| {
                    bullets
                        .iter()
                        .filter_map(|b| b.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .unwrap_or_default();
            tracing::info!(interview_id = %interview.interview_id, "report ready: {}", summary);
        }
        Err(e) => {
            tracing::error!(interview_id = %interview.interview_id, "{}", e);
        }
    }
}

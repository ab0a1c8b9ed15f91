use clap::{Parser, Subcommand};
use comfyui_cloud_proxy::api::direct::DEFAULT_DIRECT_PATH;
use comfyui_cloud_proxy::comfyui::client::output_filenames;
use comfyui_cloud_proxy::prompt::workflow::{minimal_workflow, set_positive_text};
use comfyui_cloud_proxy::{ComfyUIClient, Config};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "proxyctl", about = "CLI for the ComfyUI cloud proxy", version)]
struct Cli {
    /// Proxy base URL (defaults to PUBLIC_BASE_URL / LISTEN_HOST:LISTEN_PORT)
    #[arg(global = true, long)]
    proxy_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prompt-related commands
    Prompt {
        #[command(subcommand)]
        cmd: PromptCmd,
    },
    /// Fetch job history
    History {
        /// Only this job; prints its output filenames
        #[arg(long)]
        prompt_id: Option<String>,
        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Poll a job until it succeeds or fails
    Wait {
        #[arg(long)]
        prompt_id: String,
        /// Seconds between polls
        #[arg(long, default_value_t = 1)]
        interval: u64,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
    /// Image operations
    Image {
        #[command(subcommand)]
        cmd: ImageCmd,
    },
    /// Generate synchronously through the direct endpoint and print the image URL
    Generate {
        /// Prompt text
        prompt: String,
        /// Endpoint path on the proxy
        #[arg(long, default_value = DEFAULT_DIRECT_PATH)]
        path: String,
    },
}

#[derive(Subcommand, Debug)]
enum PromptCmd {
    /// Queue a prompt as a ComfyUI workflow
    Queue {
        /// Positive prompt text; builds a minimal workflow unless --file is given
        #[arg(long, value_name = "TEXT")]
        text: Option<String>,
        /// Negative prompt text for the generated workflow
        #[arg(long, value_name = "TEXT")]
        negative: Option<String>,
        /// Workflow JSON file to send instead of the minimal one
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Explicit prompt id
        #[arg(long)]
        prompt_id: Option<String>,
        /// Wait for the job to finish and print its history entry
        #[arg(long)]
        wait: bool,
        /// Verbose: print constructed request body before sending
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ImageCmd {
    /// Download an image from /view
    Get {
        /// Filename reported in history (defaults to the latest image)
        filename: Option<String>,
        /// Output path (defaults to ./<filename>)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    Config::dotenv_load();
    let cli = Cli::parse();
    let base_url = match cli.proxy_url {
        Some(url) => url,
        None => Config::new()?.public_base_url,
    };
    let client = ComfyUIClient::new(base_url);

    match cli.command {
        Commands::Prompt { cmd } => match cmd {
            PromptCmd::Queue { text, negative, file, prompt_id, wait, verbose } => {
                let graph = match (file, text.as_deref()) {
                    (Some(path), text) => {
                        let data = tokio::fs::read_to_string(&path).await?;
                        let raw: Value = serde_json::from_str(&data)?;
                        // Accept both wrapped {"prompt": graph} files and bare graphs
                        let mut graph = raw.get("prompt").cloned().unwrap_or(raw);
                        if let Some(t) = text {
                            if !set_positive_text(&mut graph, t) {
                                eprintln!("Warning: no text node found in {}", path.display());
                            }
                        }
                        graph
                    }
                    (None, Some(t)) => minimal_workflow(t, negative.as_deref()),
                    (None, None) => {
                        eprintln!("Must provide --text <TEXT> or --file <PATH>");
                        std::process::exit(2);
                    }
                };

                let mut body = json!({ "prompt": graph });
                if let Some(id) = prompt_id {
                    body["prompt_id"] = Value::String(id);
                }
                if verbose {
                    eprintln!("[verbose] Request body:\n{}", serde_json::to_string_pretty(&body)?);
                }

                let res = match client.queue_prompt(body).await {
                    Ok(v) => v,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                };
                println!("{}", serde_json::to_string_pretty(&res)?);

                if wait {
                    let id = res.get("prompt_id").and_then(|v| v.as_str()).unwrap_or_default();
                    let entry = client
                        .wait_for_history(id, Duration::from_secs(1), Duration::from_secs(300))
                        .await?;
                    print_entry(&entry)?;
                }
                Ok(())
            }
        },
        Commands::History { prompt_id, pretty } => {
            let hist = client.get_history(prompt_id.as_deref()).await.map_err(|e| {
                eprintln!("Error: {}", e);
                e
            })?;

            if let Some(id) = prompt_id {
                let files = hist.get(&id).map(output_filenames).unwrap_or_default();
                if files.is_empty() {
                    eprintln!("No filenames found for prompt_id={}", id);
                } else {
                    for f in files {
                        println!("{}", f);
                    }
                }
            } else if pretty {
                println!("{}", serde_json::to_string_pretty(&hist)?);
            } else {
                println!("{}", serde_json::to_string(&hist)?);
            }
            Ok(())
        }
        Commands::Wait { prompt_id, interval, timeout } => {
            let entry = client
                .wait_for_history(&prompt_id, Duration::from_secs(interval), Duration::from_secs(timeout))
                .await?;
            print_entry(&entry)
        }
        Commands::Image { cmd } => match cmd {
            ImageCmd::Get { filename, out } => {
                let bytes = client.get_image(filename.as_deref()).await.map_err(|e| {
                    eprintln!("Error: {}", e);
                    e
                })?;
                let default_name = filename.unwrap_or_else(|| "modelscope-latest.png".to_string());
                let path = out.unwrap_or_else(|| PathBuf::from(default_name));
                tokio::fs::write(&path, &bytes).await?;
                println!("Saved {} ({} bytes)", path.display(), bytes.len());
                Ok(())
            }
        },
        Commands::Generate { prompt, path } => {
            let url = client.generate_direct(&path, &prompt).await.map_err(|e| {
                eprintln!("Error: {}", e);
                e
            })?;
            println!("{}", url);
            Ok(())
        }
    }
}

fn print_entry(entry: &Value) -> Result<(), Box<dyn std::error::Error>> {
    let status = entry
        .get("status")
        .and_then(|s| s.get("status_str"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown");
    if status == "success" {
        for f in output_filenames(entry) {
            println!("{}", f);
        }
        Ok(())
    } else {
        eprintln!("Job finished with status '{}':\n{}", status, serde_json::to_string_pretty(entry)?);
        std::process::exit(1);
    }
}

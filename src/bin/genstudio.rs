//! CLI for GenStudio - text-to-image generation and comparison.

use clap::{Args, Parser, Subcommand};
use genstudio::{
    gallery, AspectRatio, ComparisonOutcome, ComparisonPlan, Config, Dispatcher, GenerationEvent,
    GenerationSession, ImageFormat, ImageProviderKind, ImageStore, ModelId, ProviderRegistry, Slot,
    StoredImage, ThemeMode,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "genstudio")]
#[command(about = "Generate and compare images via Stability AI and Flux (fal.ai)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to <config dir>/genstudio/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an image from a text prompt
    Generate(GenerateArgs),

    /// List generated images, newest first
    Gallery(GalleryArgs),

    /// List models and whether their provider is configured
    Models,
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the image
    prompt: String,

    /// Model to generate with
    #[arg(short, long, default_value = "sd3.5-large")]
    model: ModelId,

    /// Second model to run the same prompt with
    #[arg(long)]
    compare: Option<ModelId>,

    /// Aspect ratio (1:1, 16:9 or 4:3)
    #[arg(long, default_value = "1:1")]
    aspect_ratio: AspectRatio,

    /// Output format requested from Stability (png, jpeg, webp)
    #[arg(long)]
    format: Option<ImageFormat>,

    /// Directory to write images into
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Run the comparison model at the same time as the primary one
    #[arg(long)]
    concurrent: bool,
}

#[derive(Args)]
struct GalleryArgs {
    /// Directory to list
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate(args) => {
            generate(args, config, cli.json).await?;
        }
        Commands::Gallery(args) => {
            list_gallery(args, &config, cli.json)?;
        }
        Commands::Models => {
            list_models(&config, cli.json).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG` when set and valid, otherwise `genstudio=info`.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new("genstudio=info"))
}

/// Palette used by the progress display, picked once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Theme {
    accent: &'static str,
    success: &'static str,
    failure: &'static str,
    muted: &'static str,
}

impl Theme {
    const DARK: Theme = Theme {
        accent: "cyan",
        success: "green",
        failure: "red",
        muted: "white.dim",
    };

    const LIGHT: Theme = Theme {
        accent: "blue",
        success: "green.bold",
        failure: "red.bold",
        muted: "black",
    };

    /// Resolves `auto` from `COLORFGBG` (`fg;bg`, light backgrounds are 7 or 9-15).
    fn from_mode(mode: ThemeMode, colorfgbg: Option<&str>) -> Self {
        match mode {
            ThemeMode::Dark => Self::DARK,
            ThemeMode::Light => Self::LIGHT,
            ThemeMode::Auto => {
                let background = colorfgbg
                    .and_then(|value| value.rsplit(';').next())
                    .and_then(|bg| bg.trim().parse::<u8>().ok());
                match background {
                    Some(7) | Some(9..=15) => Self::LIGHT,
                    _ => Self::DARK,
                }
            }
        }
    }

    fn running(&self) -> ProgressStyle {
        ProgressStyle::with_template(&format!(
            "{{spinner:.{}}} {{prefix:.bold}} {{msg:.{}}} {{elapsed:.{}}}",
            self.accent, self.muted, self.muted
        ))
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn finished(&self, ok: bool) -> ProgressStyle {
        let color = if ok { self.success } else { self.failure };
        let mark = if ok { "✓" } else { "✗" };
        ProgressStyle::with_template(&format!("{mark} {{prefix:.bold}} {{msg:.{color}}}"))
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

async fn generate(args: GenerateArgs, mut config: Config, json_output: bool) -> anyhow::Result<()> {
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    let format = args.format.unwrap_or(config.output_format);
    let theme = Theme::from_mode(config.theme, std::env::var("COLORFGBG").ok().as_deref());

    let registry = ProviderRegistry::from_config(&config);
    let store = ImageStore::open(config.output_dir.clone())?;
    let dispatcher = Arc::new(Dispatcher::new(registry, store));

    let mut plan = ComparisonPlan::new(&args.prompt, args.model)
        .with_aspect_ratio(args.aspect_ratio)
        .with_format(format)
        .concurrent(args.concurrent || config.concurrent_comparison);
    if let Some(model) = args.compare {
        plan = plan.compare_with(model);
    }

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let session = GenerationSession::new(dispatcher).with_events(tx);
    let renderer = tokio::spawn(render_progress(rx, theme, json_output));

    let outcome = session.run(&plan).await;
    drop(session);
    let _ = renderer.await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) if e.is_preflight() => anyhow::bail!("{e} (no request was sent)"),
        Err(e) => return Err(e.into()),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&plan, &outcome))?);
    } else {
        print_outcome(&outcome);
    }

    if outcome.all_failed() {
        anyhow::bail!("no image was generated");
    }
    Ok(())
}

async fn render_progress(
    mut events: tokio::sync::mpsc::UnboundedReceiver<GenerationEvent>,
    theme: Theme,
    quiet: bool,
) {
    let multi = MultiProgress::new();
    let mut bars: HashMap<Slot, ProgressBar> = HashMap::new();

    while let Some(event) = events.recv().await {
        if quiet {
            continue;
        }
        match event {
            GenerationEvent::Started { slot, model } => {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(theme.running());
                bar.set_prefix(model.to_string());
                bar.set_message("generating");
                bar.enable_steady_tick(Duration::from_millis(100));
                bars.insert(slot, bar);
            }
            GenerationEvent::Completed { slot, image } => {
                if let Some(bar) = bars.remove(&slot) {
                    bar.set_style(theme.finished(true));
                    bar.finish_with_message(format!("saved {}", image.path.display()));
                }
            }
            GenerationEvent::Failed { slot, message, .. } => {
                if let Some(bar) = bars.remove(&slot) {
                    bar.set_style(theme.finished(false));
                    bar.finish_with_message(message);
                }
            }
        }
    }
}

fn slot_json(
    slot: Slot,
    model: ModelId,
    result: &genstudio::Result<StoredImage>,
) -> serde_json::Value {
    match result {
        Ok(image) => serde_json::json!({
            "slot": slot,
            "success": true,
            "model": model,
            "provider": image.provider,
            "output": image.path.display().to_string(),
            "size_bytes": image.size_bytes,
        }),
        Err(e) => serde_json::json!({
            "slot": slot,
            "success": false,
            "model": model,
            "error": e.to_string(),
        }),
    }
}

fn outcome_json(plan: &ComparisonPlan, outcome: &ComparisonOutcome) -> serde_json::Value {
    let mut results = vec![slot_json(Slot::Primary, plan.primary, &outcome.primary)];
    if let (Some(model), Some(comparison)) = (plan.comparison, &outcome.comparison) {
        results.push(slot_json(Slot::Comparison, model, comparison));
    }
    serde_json::json!({ "type": "image", "results": results })
}

fn print_outcome(outcome: &ComparisonOutcome) {
    let slots = std::iter::once((Slot::Primary, &outcome.primary))
        .chain(outcome.comparison.iter().map(|r| (Slot::Comparison, r)));
    for (slot, result) in slots {
        let label = match slot {
            Slot::Primary => "primary",
            Slot::Comparison => "comparison",
        };
        match result {
            Ok(image) => println!(
                "[{}] Generated image: {} ({} bytes) via {}",
                label,
                image.path.display(),
                image.size_bytes,
                image.provider.display_name()
            ),
            Err(e) => println!("[{}] Failed: {}", label, e),
        }
    }
}

fn list_gallery(args: GalleryArgs, config: &Config, json_output: bool) -> anyhow::Result<()> {
    let dir = args.output_dir.unwrap_or_else(|| config.output_dir.clone());
    let entries = gallery::load(&dir)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No images in {}", dir.display());
        return Ok(());
    }
    println!("{} image(s) in {}:\n", entries.len(), dir.display());
    for entry in &entries {
        println!(
            "  {}  [{}]",
            entry.file_name,
            entry.model.as_deref().unwrap_or("unknown model")
        );
        if let Some(prompt) = &entry.prompt {
            println!("    {}", prompt);
        }
    }
    Ok(())
}

async fn list_models(config: &Config, json_output: bool) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct ModelInfo {
        id: &'static str,
        provider: &'static str,
        env_var: &'static str,
        available: bool,
    }

    let registry = ProviderRegistry::from_config(config);

    let mut healthy: HashMap<ImageProviderKind, bool> = HashMap::new();
    for model in registry.models() {
        let kind = model.provider();
        if healthy.contains_key(&kind) {
            continue;
        }
        let ok = match registry.resolve(model)?.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(provider = %kind, "health check failed: {e}");
                false
            }
        };
        healthy.insert(kind, ok);
    }

    let models: Vec<ModelInfo> = ModelId::ALL
        .iter()
        .map(|model| ModelInfo {
            id: model.as_str(),
            provider: model.provider().display_name(),
            env_var: model.provider().env_var(),
            available: healthy.get(&model.provider()).copied().unwrap_or(false),
        })
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        println!("Available models:\n");
        for m in &models {
            let status = if m.available { "✓" } else { "✗" };
            println!("  {} {} ({})", status, m.id, m.provider);
            if !m.available {
                println!("    API key: {}", m.env_var);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_respects_rust_log() {
        assert!(log_filter(Some("genstudio=debug"))
            .to_string()
            .contains("genstudio=debug"));
        assert!(!log_filter(Some("genstudio=debug"))
            .to_string()
            .contains("genstudio=info"));
        assert!(log_filter(None).to_string().contains("genstudio=info"));
        assert!(log_filter(Some("  ")).to_string().contains("genstudio=info"));
    }

    #[test]
    fn test_theme_explicit_modes() {
        assert_eq!(Theme::from_mode(ThemeMode::Dark, Some("0;15")), Theme::DARK);
        assert_eq!(Theme::from_mode(ThemeMode::Light, None), Theme::LIGHT);
    }

    #[test]
    fn test_theme_auto_from_colorfgbg() {
        assert_eq!(Theme::from_mode(ThemeMode::Auto, Some("0;15")), Theme::LIGHT);
        assert_eq!(Theme::from_mode(ThemeMode::Auto, Some("0;default;7")), Theme::LIGHT);
        assert_eq!(Theme::from_mode(ThemeMode::Auto, Some("15;0")), Theme::DARK);
        assert_eq!(Theme::from_mode(ThemeMode::Auto, Some("garbage")), Theme::DARK);
        assert_eq!(Theme::from_mode(ThemeMode::Auto, None), Theme::DARK);
    }

    #[test]
    fn test_cli_parses_comparison() {
        let cli = Cli::try_parse_from([
            "genstudio",
            "generate",
            "a fox",
            "-m",
            "flux-dev",
            "--compare",
            "sd3-medium",
            "--aspect-ratio",
            "16:9",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.model, ModelId::FluxDev);
                assert_eq!(args.compare, Some(ModelId::Sd3Medium));
                assert_eq!(args.aspect_ratio, AspectRatio::Landscape);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_model() {
        assert!(Cli::try_parse_from(["genstudio", "generate", "a fox", "-m", "dall-e"]).is_err());
    }
}

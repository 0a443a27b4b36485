//! CLI for gpt-oxidized: demo, generate, info, bench.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use gpt_oxidized::{
    create_demo_model, create_demo_model_seeded, load_weights, validate_model, BpeCodec, CharCodec,
    Codec, InferenceEngine, ModelWeights, Profiler, SamplingParams, TextGenerator, MAX_NEW_TOKENS,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gpt-oxidized")]
#[command(about = "Decoder-only GPT inference in Rust")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate from a random demo model (character vocabulary)
    Demo {
        #[arg(long, default_value = "Hello")]
        prompt: String,
        #[arg(long, default_value = "32")]
        max_new: usize,
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate text: --model <weights.json> --prompt <text> [--tokenizer <tokenizer.json>]
    Generate {
        #[arg(short, long)]
        model: PathBuf,
        /// BPE tokenizer document; the weight document's vocab is used when omitted
        #[arg(long)]
        tokenizer: Option<PathBuf>,
        #[arg(short, long, default_value = "")]
        prompt: String,
        #[arg(long, default_value = "64")]
        max_new: usize,
        #[arg(short, long, default_value = "0.9")]
        temperature: f32,
        #[arg(long, default_value = "40")]
        top_k: usize,
        #[arg(long, default_value = "1.0")]
        top_p: f32,
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show model configuration and tensor health
    Info {
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Measure forward pass latency
    Bench {
        #[arg(short, long)]
        model: PathBuf,
        #[arg(long, default_value = "20")]
        iterations: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo {
            prompt,
            max_new,
            seed,
        } => run_demo(&prompt, max_new, seed)?,
        Commands::Generate {
            model,
            tokenizer,
            prompt,
            max_new,
            temperature,
            top_k,
            top_p,
            seed,
        } => {
            let params = SamplingParams {
                temperature,
                top_k,
                top_p,
            };
            run_generate(&model, tokenizer.as_deref(), &prompt, max_new, params, seed)?
        }
        Commands::Info { model } => run_info(&model)?,
        Commands::Bench { model, iterations } => run_bench(&model, iterations)?,
    }
    Ok(())
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

fn run_demo(prompt: &str, max_new: usize, seed: Option<u64>) -> Result<()> {
    info!("Creating demo model...");
    let weights = match seed {
        Some(s) => create_demo_model_seeded(s),
        None => create_demo_model(),
    };
    let codec = CharCodec::from_weights(&weights).context("demo model has no vocab")?;
    let gen = TextGenerator::from_weights(Arc::new(weights))?;

    let prompt_ids = codec.encode(prompt);
    info!("Prompt token count: {}", prompt_ids.len());
    let mut rng = make_rng(seed);
    let ids = gen.generate(
        &prompt_ids,
        max_new.min(MAX_NEW_TOKENS),
        &SamplingParams::default(),
        &mut rng,
    )?;
    println!("{}{}", prompt, codec.decode(&ids));
    Ok(())
}

fn run_generate(
    model_path: &Path,
    tokenizer_path: Option<&Path>,
    prompt: &str,
    max_new: usize,
    params: SamplingParams,
    seed: Option<u64>,
) -> Result<()> {
    info!("Loading model from {:?}...", model_path);
    let weights = load_weights(model_path)
        .with_context(|| format!("failed to load weights from {}", model_path.display()))?;

    let codec: Box<dyn Codec> = match tokenizer_path {
        Some(path) => Box::new(
            BpeCodec::from_file(path)
                .with_context(|| format!("failed to load tokenizer {}", path.display()))?,
        ),
        None => Box::new(
            CharCodec::from_weights(&weights)
                .context("weight document has no vocab; pass --tokenizer")?,
        ),
    };
    if codec.vocab_size() > weights.vocab_size() {
        warn!(
            "Tokenizer has {} ids but the model only {}",
            codec.vocab_size(),
            weights.vocab_size()
        );
    }

    let max_new = if max_new > MAX_NEW_TOKENS {
        warn!("max_new {} capped at {}", max_new, MAX_NEW_TOKENS);
        MAX_NEW_TOKENS
    } else {
        max_new
    };

    let prompt_ids = codec.encode(prompt);
    info!("Prompt token count: {}", prompt_ids.len());
    let gen = TextGenerator::from_weights(Arc::new(weights))?;
    let mut rng = make_rng(seed);
    let ids = gen.generate(&prompt_ids, max_new, &params, &mut rng)?;
    println!("{}", codec.decode(&ids));
    Ok(())
}

fn probe_ids(weights: &ModelWeights) -> Vec<usize> {
    let n = weights.config.max_seq.min(weights.vocab_size()).min(8);
    (0..n).collect()
}

fn run_info(model_path: &Path) -> Result<()> {
    let weights = load_weights(model_path)?;
    let c = &weights.config;
    println!("vocab_size: {}", c.vocab_size);
    println!("d_model: {}", c.d_model);
    println!("n_head: {}", c.n_head);
    println!("n_layer: {}", c.n_layer);
    println!("d_ff: {}", c.d_ff);
    println!("max_seq: {}", c.max_seq);
    println!("parameters: {}", weights.parameter_count());

    let report = validate_model(&weights, &probe_ids(&weights))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.passed {
        anyhow::bail!("model failed health checks");
    }
    Ok(())
}

fn run_bench(model_path: &Path, iterations: usize) -> Result<()> {
    info!("Loading model from {:?}...", model_path);
    let weights = load_weights(model_path)?;
    let input = probe_ids(&weights);
    let engine = InferenceEngine::new(weights)?;
    let warmup = 5;
    for _ in 0..warmup {
        engine.forward(&input)?;
    }
    let mut profiler = Profiler::new();
    for _ in 0..iterations {
        profiler.time("forward", || engine.forward(&input))?;
    }
    println!(
        "Forward pass ({} tokens): {:.3} ms mean over {} iters",
        input.len(),
        profiler.mean_ms("forward"),
        iterations
    );
    Ok(())
}

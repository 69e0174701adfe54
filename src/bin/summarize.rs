use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fmri_response::{
    export_safetensors, export_text, project, summarize, AnalysisConfig, Inherited, Layout,
    MissingData, Outline, ReadyPolicy,
};

#[derive(Clone, Copy, ValueEnum)]
enum Ready {
    /// A node is ready when any child is.
    Any,
    /// A node is ready only when every child is.
    All,
}

#[derive(Parser)]
#[command(name = "summarize", about = "Aggregate and summarise stimulus-locked fMRI responses")]
struct Args {
    /// Project file (JSON)
    project: PathBuf,

    /// Node to summarise as comma-separated child indices, e.g. "0,1"
    /// (default: the saved selection, else the whole project)
    #[arg(long)]
    node: Option<String>,

    /// Output path; `.safetensors` for tensors, anything else for a TSV table
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write one combined `means` tensor instead of per-intensity tensors
    #[arg(long)]
    combined: bool,

    /// Spline smoothing factor for FWHM and amplitude (default: 20.0)
    #[arg(long, default_value_t = 20.0)]
    smoothing: f64,

    /// Treat exact zeros as missing samples in mean / std / SEM
    #[arg(long)]
    zero_is_missing: bool,

    /// Readiness rule for project, group and individual nodes
    #[arg(long, value_enum, default_value_t = Ready::Any)]
    ready: Ready,

    /// Print the project tree and exit
    #[arg(long)]
    list: bool,
}

fn parse_node(s: &str) -> Result<Vec<usize>> {
    s.split(',')
        .filter(|p| !p.trim().is_empty())
        .map(|p| p.trim().parse::<usize>().with_context(|| format!("bad node index '{p}'")))
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let cfg = AnalysisConfig {
        smoothing: args.smoothing,
        missing: if args.zero_is_missing { MissingData::ZeroIsMissing } else { MissingData::NanIsMissing },
        ready_policy: match args.ready {
            Ready::Any => ReadyPolicy::Any,
            Ready::All => ReadyPolicy::All,
        },
        ..AnalysisConfig::default()
    };
    let ctx = Inherited::root(&cfg);

    let mut loaded = project::load(&args.project)
        .with_context(|| format!("loading {}", args.project.display()))?;
    for path in &loaded.missing {
        eprintln!("missing: {}", path.display());
    }

    if args.list {
        print!("{}", Outline::new(&loaded.project, ctx).render());
        return Ok(());
    }

    let node = match &args.node {
        Some(s) => parse_node(s)?,
        None => loaded.current.clone(),
    };
    let Some(target) = loaded.project.descendant(&node) else {
        bail!("no node at {node:?}");
    };
    let name = target.name.clone();

    let Some(responses) = loaded.project.aggregate_at(&node, &ctx)? else {
        bail!("'{name}' is not ready: a scan, mask and stimulus table are required");
    };
    let summaries = summarize(responses, &cfg);

    for (intensity, s) in &summaries {
        let fwhm = s.fwhm.map_or_else(|| "-".to_string(), |w| format!("{:.3}", w.width()));
        let peak = s.amplitude.map_or_else(|| "-".to_string(), |a| format!("{:.3} @ {}", a.value, a.index));
        println!("{name} intensity {intensity}: {} events, fwhm {fwhm}, peak {peak}", s.events);
    }

    if let Some(out) = &args.output {
        let is_st = out.extension().and_then(|e| e.to_str()) == Some("safetensors");
        if is_st {
            let layout = if args.combined { Layout::Combined } else { Layout::PerIntensity };
            export_safetensors(&summaries, out, layout)?;
        } else {
            export_text(&summaries, out)?;
        }
        println!("Written → {}", out.display());
    }

    Ok(())
}

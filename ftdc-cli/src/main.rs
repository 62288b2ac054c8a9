//! FTDC CLI - write and inspect FTDC chunk files

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use ftdc_core::chunk::{read_chunks, read_flattened, read_matrix, read_structured};
use ftdc_core::marshal::json_to_document;
use ftdc_core::{config, Collector, CollectorConfig, Document};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress a JSON-lines file of samples into a chunk file
    Compress {
        /// Line-delimited JSON samples, one object per line
        input: PathBuf,

        /// Chunk file to write
        output: PathBuf,

        /// Collector configuration as JSON
        #[clap(short, long)]
        config: Option<PathBuf>,

        /// Samples per chunk, overrides the configuration file
        #[clap(short, long)]
        max_samples: Option<usize>,

        /// Fail on schema changes instead of starting a new chunk
        #[clap(long)]
        strict: bool,

        /// Feed samples through a background worker
        #[clap(long)]
        buffered: bool,

        /// Metadata document written ahead of the first chunk, as JSON
        #[clap(long)]
        metadata: Option<String>,
    },

    /// Print the samples of a chunk file as JSON lines
    Dump {
        input: PathBuf,

        #[clap(short, long, value_enum, default_value_t = Format::Structured)]
        format: Format,

        /// Print the metadata document first
        #[clap(long)]
        metadata: bool,
    },

    /// Print per-chunk statistics of a chunk file
    Stats { input: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    /// One document per sample, shaped like the input
    Structured,
    /// One document per sample, dotted metric keys only
    Flat,
    /// One document per chunk, one array per metric
    Matrix,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Compress {
            input,
            output,
            config: config_path,
            max_samples,
            strict,
            buffered,
            metadata,
        } => {
            let mut collector_config = load_config(config_path.as_deref())?;
            if let Some(max_samples) = max_samples {
                collector_config.max_samples = max_samples;
            }
            if strict {
                collector_config.dynamic = false;
            }
            if buffered && collector_config.buffer_size.is_none() {
                collector_config.buffer_size = Some(config::DEFAULT_BUFFER_SIZE);
            }
            compress(&input, &output, &collector_config, metadata.as_deref())
        }
        Command::Dump {
            input,
            format,
            metadata,
        } => dump(&input, format, metadata),
        Command::Stats { input } => stats(&input),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CollectorConfig> {
    let Some(path) = path else {
        return Ok(CollectorConfig::default());
    };

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let config = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    debug!(?config, "loaded collector configuration");
    Ok(config)
}

fn compress(
    input: &Path,
    output: &Path,
    config: &CollectorConfig,
    metadata: Option<&str>,
) -> anyhow::Result<()> {
    let reader = BufReader::new(
        File::open(input).with_context(|| format!("opening {}", input.display()))?,
    );
    let mut collector = config.build()?;

    if let Some(metadata) = metadata {
        let value: serde_json::Value =
            serde_json::from_str(metadata).context("parsing metadata")?;
        collector.set_metadata(json_to_document(value)?);
    }

    let mut count = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let value: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid JSON", idx + 1))?;
        let sample = json_to_document(value).with_context(|| format!("line {}", idx + 1))?;
        collector
            .add(sample)
            .with_context(|| format!("line {}", idx + 1))?;
        count += 1;
    }

    if count == 0 {
        bail!("{} holds no samples", input.display());
    }

    let mut writer = BufWriter::new(
        File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );
    let bytes = collector.resolve()?;
    let info = collector.info();
    writer.write_all(&bytes)?;
    writer.flush()?;

    info!(
        samples = count,
        collected = info.sample_count,
        metrics = info.metric_count,
        bytes = bytes.len(),
        output = %output.display(),
        "compressed samples"
    );
    Ok(())
}

fn open(input: &Path) -> anyhow::Result<BufReader<File>> {
    Ok(BufReader::new(
        File::open(input).with_context(|| format!("opening {}", input.display()))?,
    ))
}

fn print_json(out: &mut impl Write, doc: &Document) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, &doc.to_json())?;
    writeln!(out)?;
    Ok(())
}

fn dump(input: &Path, format: Format, show_metadata: bool) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let reader = open(input)?;

    // metadata is only known once the first chunk has been read
    let mut metadata_pending = show_metadata;
    let mut emit = |out: &mut BufWriter<_>,
                    metadata: Option<&Document>,
                    doc: &Document|
     -> anyhow::Result<()> {
        if metadata_pending {
            if let Some(metadata) = metadata {
                print_json(out, metadata)?;
            }
            metadata_pending = false;
        }
        print_json(out, doc)
    };

    match format {
        Format::Structured | Format::Flat => {
            let mut iter = match format {
                Format::Flat => read_flattened(reader),
                _ => read_structured(reader),
            };
            while let Some(doc) = iter.next() {
                emit(&mut out, iter.metadata(), &doc)?;
            }
            iter.close()?;
        }
        Format::Matrix => {
            let mut iter = read_matrix(reader);
            while let Some(doc) = iter.next() {
                emit(&mut out, iter.metadata(), &doc)?;
            }
            iter.close()?;
        }
    }

    out.flush()?;
    Ok(())
}

fn stats(input: &Path) -> anyhow::Result<()> {
    let mut iter = read_chunks(open(input)?);
    let mut total_samples = 0usize;
    let mut chunks = 0usize;

    println!("{:>6} {:>8} {:>8}  start", "chunk", "samples", "metrics");
    while let Some(chunk) = iter.next() {
        let start = chunk
            .start_time()
            .map(|ms| ftdc_core::Value::DateTime(ms).to_json().to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>6} {:>8} {:>8}  {}",
            chunks,
            chunk.len(),
            chunk.metrics().len(),
            start
        );
        total_samples += chunk.len();
        chunks += 1;
    }
    iter.close()?;

    println!("{} chunks, {} samples", chunks, total_samples);
    Ok(())
}

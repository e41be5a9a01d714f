use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use clp_ir::core::ToolConfig;
use clp_ir::event::sink::{SinkEvent, DEFAULT_HIGH_WATER_MARK};
use clp_ir::{ChannelSink, LogEvent, LogLevel, StreamReader, StreamWriter, Value, WriteRecord};
use memmap2::Mmap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

/// 压缩 IR 日志流工具
#[derive(Parser)]
#[command(name = "clp-ir")]
#[command(about = "Inspect, filter and produce compressed IR log streams")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 $XDG_CONFIG_HOME/clp-ir/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 打印 metadata 与统计报告
    Inspect { file: PathBuf },
    /// 按范围 / level / 查询输出事件
    Cat {
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        begin: usize,
        #[arg(long)]
        end: Option<usize>,
        /// 逗号分隔的 level 名，如 `warn,error`
        #[arg(long, value_delimiter = ',')]
        levels: Vec<String>,
        #[arg(long)]
        query: Option<String>,
    },
    /// 输出时间戳最接近的事件
    Nearest {
        file: PathBuf,
        #[arg(allow_hyphen_values = true)]
        timestamp: i64,
    },
    /// JSON lines -> 结构化 IR 流
    Encode {
        input: PathBuf,
        output: PathBuf,
        /// 覆盖配置中的 zstd 等级
        #[arg(long)]
        level: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ToolConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect { file } => cmd_inspect(&file, &config),
        Commands::Cat {
            file,
            begin,
            end,
            levels,
            query,
        } => cmd_cat(&file, &config, begin, end, &levels, query.as_deref()),
        Commands::Nearest { file, timestamp } => cmd_nearest(&file, &config, timestamp),
        Commands::Encode {
            input,
            output,
            level,
        } => cmd_encode(&input, &output, &config, level).await,
    }
}

fn open_reader(path: &Path, config: &ToolConfig) -> anyhow::Result<StreamReader> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    // 只读映射；文件在读取期间不应被修改
    let mmap = unsafe { Mmap::map(&file)? };
    let mut reader = StreamReader::open(&mmap, config.reader.clone())
        .with_context(|| format!("read IR stream {}", path.display()))?;
    reader.deserialize_stream()?;
    Ok(reader)
}

fn print_event(ev: &LogEvent) {
    println!("{}\t{}\t{}\t{}", ev.seq, ev.timestamp, ev.level, ev.message());
}

fn cmd_inspect(path: &Path, config: &ToolConfig) -> anyhow::Result<()> {
    let reader = open_reader(path, config)?;
    println!("{}", serde_json::to_string_pretty(reader.metadata())?);
    print!("{}", reader.stats());
    Ok(())
}

fn cmd_cat(
    path: &Path,
    config: &ToolConfig,
    begin: usize,
    end: Option<usize>,
    levels: &[String],
    query: Option<&str>,
) -> anyhow::Result<()> {
    let mut reader = open_reader(path, config)?;

    let level_filter = if levels.is_empty() {
        None
    } else {
        let parsed = levels
            .iter()
            .map(|name| {
                LogLevel::parse(name)
                    .map(LogLevel::as_u8)
                    .with_context(|| format!("unknown log level '{name}'"))
            })
            .collect::<anyhow::Result<Vec<u8>>>()?;
        Some(parsed)
    };
    reader.filter_log_events(level_filter.as_deref(), query)?;

    let len = reader
        .filtered_log_event_map()
        .map_or(reader.num_events_buffered(), <[u64]>::len);
    let end = end.unwrap_or(len);
    let events = reader
        .decode_range(begin, end, true)
        .with_context(|| format!("range [{begin}, {end}) out of bounds (len {len})"))?;
    for ev in &events {
        print_event(ev);
    }
    info!("Printed {} of {} events", events.len(), reader.num_events_buffered());
    Ok(())
}

fn cmd_nearest(path: &Path, config: &ToolConfig, timestamp: i64) -> anyhow::Result<()> {
    let reader = open_reader(path, config)?;
    match reader.find_nearest_log_event_by_timestamp(timestamp) {
        Some(idx) => {
            let ev = reader
                .decode_range(idx, idx + 1, false)
                .and_then(|mut v| v.pop())
                .context("nearest event vanished from index")?;
            print_event(&ev);
        }
        None => println!("(no events)"),
    }
    Ok(())
}

async fn cmd_encode(
    input: &Path,
    output: &Path,
    config: &ToolConfig,
    level: Option<i32>,
) -> anyhow::Result<()> {
    let mut writer_config = config.writer.clone();
    if let Some(level) = level {
        writer_config.compression_level = level;
    }

    let (sink, mut rx) = ChannelSink::new(DEFAULT_HIGH_WATER_MARK)?;
    let mut out = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("create {}", output.display()))?;
    let consumer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            match ev {
                SinkEvent::Chunk(bytes) => out.write_all(&bytes).await?,
                SinkEvent::Closed => break,
                SinkEvent::Aborted(reason) => anyhow::bail!("stream aborted: {reason}"),
            }
        }
        out.flush().await?;
        Ok::<_, anyhow::Error>(())
    });

    let mut writer = StreamWriter::open(sink, writer_config).await?;
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("open {}", input.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut lineno = 0usize;
    while let Some(line) = lines.next_line().await? {
        lineno += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str::<serde_json::Value>(&line)
            .map_err(anyhow::Error::from)
            .and_then(|json| Value::from_json(json).map_err(anyhow::Error::from));
        let record = match record {
            Ok(v) => v,
            Err(e) => {
                writer.abort(format!("line {lineno}: {e}")).await?;
                // consumer 会以 aborted 结束，错误以这里为准
                let _ = consumer.await;
                anyhow::bail!("line {lineno}: {e}");
            }
        };
        writer
            .write(WriteRecord::Value(record))
            .await
            .with_context(|| format!("line {lineno}"))?;
    }
    writer.close().await?;
    consumer.await??;

    info!(
        "Encoded {} events into {} ({} bytes)",
        writer.events_written(),
        output.display(),
        writer.bytes_written()
    );
    Ok(())
}

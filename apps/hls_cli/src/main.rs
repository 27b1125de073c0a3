//! hls-cli - 命令行演示
//!
//! 用内存模拟的引擎与输出端驱动播放控制器，从标准输入读取命令。
//! 日志级别通过 `RUST_LOG` 控制。

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use hls_player::sim::{SimEngineFactory, SimSink};
use hls_player::{
    EngineErrorKind, EngineLevel, HlsPlayer, PlayerConfig, PlayerEvent, PlayerEventKind,
    QualitySelector, SourceOptions,
};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(100);
const DEFAULT_DURATION: f64 = 180.0;

struct Args {
    url: String,
    config: Option<PathBuf>,
    headers: Vec<(String, String)>,
    start_time: Option<f64>,
    duration: f64,
}

/// 标准输入命令
#[derive(Debug, PartialEq)]
enum Command {
    Load(String),
    Play,
    Pause,
    Volume(f64),
    Seek(f64),
    Quality(QualitySelector),
    /// 注入一个致命网络错误
    Fail,
    State,
    Quit,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let program = argv.first().map_or("hls-cli", String::as_str);
    let args = match parse_args(&argv[1.min(argv.len())..]) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            print_usage(program);
            std::process::exit(1);
        }
    };

    let config = match &args.config {
        Some(path) => match PlayerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("failed to read config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => PlayerConfig::default(),
    };

    let mut demo = Demo::new(config, args.duration);
    demo.load(&args.url, Some(source_options(&args)));

    let commands = spawn_stdin_reader();
    let mut last_tick = Instant::now();

    loop {
        match commands.recv_timeout(TICK) {
            Ok(line) => match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => demo.handle(command),
                Err(msg) => eprintln!("{}", msg),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        demo.tick(now.duration_since(last_tick).as_secs_f64());
        last_tick = now;
    }

    demo.player.destroy();
}

fn print_usage(program: &str) {
    eprintln!("Usage:");
    eprintln!(
        "  {} <url> [--config player.json] [--header Name:Value]... [--start <sec>] [--duration <sec>]",
        program
    );
    eprintln!();
    eprintln!("Commands (stdin):");
    eprintln!("  load <url> | play | pause | vol <0-1> | seek <sec>");
    eprintln!("  quality <auto|low|medium|high|index> | fail | state | quit");
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut url = None;
    let mut config = None;
    let mut headers = Vec::new();
    let mut start_time = None;
    let mut duration = DEFAULT_DURATION;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config requires a path")?;
                config = Some(PathBuf::from(path));
            }
            "--header" => {
                let header = iter.next().ok_or("--header requires Name:Value")?;
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| format!("Invalid header: {}", header))?;
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            "--start" => {
                let value = iter.next().ok_or("--start requires seconds")?;
                start_time = Some(parse_seconds(value)?);
            }
            "--duration" => {
                let value = iter.next().ok_or("--duration requires seconds")?;
                duration = parse_seconds(value)?;
            }
            other if other.starts_with("--") => return Err(format!("Unknown option: {}", other)),
            other => url = Some(other.to_string()),
        }
    }

    Ok(Args {
        url: url.ok_or("Missing source url")?,
        config,
        headers,
        start_time,
        duration,
    })
}

fn parse_seconds(value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| format!("Invalid seconds: {}", value))
}

fn source_options(args: &Args) -> SourceOptions {
    let mut options = SourceOptions::default();
    for (name, value) in &args.headers {
        options = options.with_header(name.as_str(), value.as_str());
    }
    if let Some(start) = args.start_time {
        options = options.with_start_time(start);
    }
    options
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Err("Empty command".to_string());
    };
    let arg = parts.next();

    let number = |arg: Option<&str>| -> Result<f64, String> {
        arg.and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| format!("'{}' requires a number", name))
    };

    match name {
        "load" => arg
            .map(|url| Command::Load(url.to_string()))
            .ok_or_else(|| "'load' requires a url".to_string()),
        "play" => Ok(Command::Play),
        "pause" => Ok(Command::Pause),
        "vol" => number(arg).map(Command::Volume),
        "seek" => number(arg).map(Command::Seek),
        "quality" => match arg {
            Some("auto") => Ok(Command::Quality(QualitySelector::Auto)),
            Some(value) => Ok(Command::Quality(match value.parse::<usize>() {
                Ok(id) => QualitySelector::Level(id),
                Err(_) => QualitySelector::Name(value.to_string()),
            })),
            None => Err("'quality' requires a level".to_string()),
        },
        "fail" => Ok(Command::Fail),
        "state" => Ok(Command::State),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = bounded(16);
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn describe(event: &PlayerEvent) -> String {
    match event {
        PlayerEvent::TrackEnd(Some(track)) | PlayerEvent::LoadedMetadata(Some(track)) => {
            format!("{} {}", event.kind(), json(track))
        }
        PlayerEvent::Error(error) => format!("error {}", json(error)),
        PlayerEvent::QualityChange(level) => format!("quality-change {}", json(level)),
        PlayerEvent::TimeUpdate(update) => format!("timeupdate {}", json(update)),
        other => other.kind().to_string(),
    }
}

fn json(value: &impl serde::Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<{}>", e))
}

/// 演示会话：控制器加上手动推进的模拟端
struct Demo {
    player: HlsPlayer,
    sink: SimSink,
    engines: SimEngineFactory,
    pool: LocalPool,
    duration: f64,
    /// 新引擎在下一个 tick 完成清单解析
    manifest_due: bool,
}

impl Demo {
    fn new(config: PlayerConfig, duration: f64) -> Self {
        let pool = LocalPool::new();
        let sink = SimSink::new();
        let engines = SimEngineFactory::new().with_levels(vec![
            EngineLevel::new(64_000).with_codec("mp4a.40.5"),
            EngineLevel::new(256_000).with_codec("mp4a.40.2"),
            EngineLevel::new(640_000).with_codec("mp4a.40.2"),
        ]);
        let player = HlsPlayer::new(
            config,
            Box::new(sink.clone()),
            Box::new(engines.clone()),
            pool.spawner(),
        );

        for kind in PlayerEventKind::ALL {
            if kind == PlayerEventKind::TimeUpdate {
                continue;
            }
            player.on(kind, |event| println!("{}", describe(event)));
        }

        Self {
            player,
            sink,
            engines,
            pool,
            duration,
            manifest_due: false,
        }
    }

    fn load(&mut self, url: &str, options: Option<SourceOptions>) {
        let load = self.player.set_source(url, options);
        self.manifest_due = true;

        let spawned = self.pool.spawner().spawn_local(async move {
            match load.await {
                Ok(track) => tracing::info!("source ready: {}", json(&track)),
                Err(e) if e.is_superseded() => tracing::debug!("source load superseded"),
                Err(e) => tracing::error!("source load failed: {}", e),
            }
        });
        if let Err(e) = spawned {
            tracing::error!("failed to watch source load: {}", e);
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Load(url) => self.load(&url, None),
            Command::Play => {
                self.player.play();
            }
            Command::Pause => {
                self.player.pause();
            }
            Command::Volume(volume) => {
                self.player.set_volume(volume);
                println!("volume {}", self.player.volume());
            }
            Command::Seek(time) => {
                self.player.begin_seek();
                self.player.preview_seek(time);
                self.player.commit_seek();
            }
            Command::Quality(selector) => {
                self.player.set_quality(selector);
                let levels = self.player.get_quality_levels();
                println!("levels {}", json(&levels));
            }
            Command::Fail => match self.engines.latest() {
                Some(engine) => {
                    engine.fail(EngineErrorKind::Network, "fragLoadError", true);
                }
                None => eprintln!("No engine"),
            },
            Command::State => println!("state {}", json(&self.player.get_state())),
            Command::Quit => {}
        }
    }

    /// 推进模拟时钟并派发积压的事件
    fn tick(&mut self, elapsed: f64) {
        if self.manifest_due {
            self.manifest_due = false;
            if let Some(engine) = self.engines.latest() {
                engine.parse_manifest();
                self.sink.load_metadata(self.duration);
                self.sink.make_playable();
            }
        }

        self.pool.run_until_stalled();
        self.sink.advance(elapsed);
        self.sink.flush();
        self.pool.run_until_stalled();
    }
}

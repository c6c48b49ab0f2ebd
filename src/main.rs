use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use prompt_cast::models::platform;
use prompt_cast::services::{CatalogService, HistoryStore};
use prompt_cast::utils::logging::{self, truncate_text};
use prompt_cast::{App, Config, InjectOptions};

const HISTORY_WRITE_GRACE: Duration = Duration::from_secs(5);

/// 把同一个提示词同时发送到多个 AI 聊天网页
#[derive(Debug, Parser)]
#[command(name = "promptcast", version)]
struct Cli {
    /// 显示详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 发送提示词
    Send {
        prompt: String,
        /// 目标平台（可重复），例如 -p kimi -p chatgpt
        #[arg(short, long = "platform", required = true)]
        platforms: Vec<String>,
        /// 一次性写入，不模拟逐字输入
        #[arg(long)]
        paste: bool,
        /// 不采集回复
        #[arg(long)]
        no_harvest: bool,
        /// 等待回复的最长秒数（默认为回复采集上限）
        #[arg(long)]
        wait: Option<u64>,
    },
    /// 列出支持的平台
    Platforms,
    /// 刷新并显示选择器目录
    Catalog,
    /// 显示历史记录
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(cli.verbose || config.verbose_logging);

    match cli.command {
        Command::Send {
            prompt,
            platforms,
            paste,
            no_harvest,
            wait,
        } => {
            let options = InjectOptions {
                simulate_typing: !paste,
                harvest_response: !no_harvest,
            };

            // 采集器自身有硬上限，额外留出写入历史的时间
            let wait = wait
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.harvest_ceiling() + HISTORY_WRITE_GRACE);

            let mut app = App::initialize(config).await?;
            let report = app.send(&prompt, &platforms, options).await;

            for (platform_id, outcome) in &report.outcomes {
                match outcome.guidance() {
                    None => println!("✅ {}", platform_id),
                    Some(hint) => println!("❌ {}: {}", platform_id, hint),
                }
            }

            if options.harvest_response {
                let expected = report.success_count();
                let saved = app.wait_for_responses(expected, wait).await;
                info!("📝 已保存 {}/{} 条回复", saved, expected);
            }
            app.shutdown();
        }
        Command::Platforms => {
            for platform in platform::all() {
                println!("{:<12} {:<14} {}", platform.id, platform.name, platform.url);
            }
        }
        Command::Catalog => {
            let catalog = CatalogService::load(&config).await;
            let flags = catalog.refresh_flags().await;
            let outcome = catalog.refresh().await;
            let current = catalog.current();

            println!("版本: {} ({:?})", current.version, outcome);
            println!("获取时间: {}", current.fetched_at);
            println!("登录墙检测: {}", catalog.signin_detection(config.signin_detection));
            if flags.force_refresh {
                println!("远端要求强制刷新");
            }
            let mut ids: Vec<_> = current.platforms.keys().collect();
            ids.sort();
            for id in ids {
                println!("  - {}", id);
            }
        }
        Command::History => {
            let history = HistoryStore::open(config.history_path()).await?;
            let data = history.snapshot().await;

            if data.prompts.is_empty() {
                warn!("⚠️ 暂无历史记录");
            }
            for entry in &data.prompts {
                println!(
                    "[{}] {} → {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    truncate_text(&entry.prompt, 40),
                    entry.platforms.join(", ")
                );
                for result in data.results.iter().filter(|r| r.job_id == entry.job_id) {
                    let status = if result.success { "✅" } else { "❌" };
                    println!(
                        "    {} {} {}",
                        status,
                        result.platform,
                        result.error.as_deref().unwrap_or_default()
                    );
                }
            }
            for response in &data.responses {
                println!(
                    "[{}] {}: {}",
                    response.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    response.platform_id,
                    truncate_text(&response.text, 80)
                );
            }
        }
    }

    Ok(())
}

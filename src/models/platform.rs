//! 目标平台注册表

use phf::phf_map;
use url::Url;

/// 目标平台
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// 平台标识
    pub id: &'static str,
    /// 显示名称
    pub name: &'static str,
    /// 起始页面
    pub url: &'static str,
}

impl Platform {
    /// 期望的域名（起始页面的主机名）
    pub fn domain(&self) -> Option<String> {
        Url::parse(self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }

    /// 判断页面地址是否仍属于该平台
    ///
    /// 主机名相同或为其子域名即视为匹配。
    pub fn owns_url(&self, page_url: &str) -> bool {
        let Some(domain) = self.domain() else {
            return false;
        };
        let Some(host) = Url::parse(page_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
        else {
            return false;
        };

        host == domain || host.ends_with(&format!(".{}", domain))
    }
}

static PLATFORMS: phf::Map<&'static str, Platform> = phf_map! {
    "kimi" => Platform { id: "kimi", name: "Kimi", url: "https://www.kimi.com/" },
    "chatgpt" => Platform { id: "chatgpt", name: "ChatGPT", url: "https://chatgpt.com/" },
    "gemini" => Platform { id: "gemini", name: "Gemini", url: "https://gemini.google.com/app" },
    "claude" => Platform { id: "claude", name: "Claude", url: "https://claude.ai/" },
    "perplexity" => Platform { id: "perplexity", name: "Perplexity", url: "https://www.perplexity.ai/" },
    "deepseek" => Platform { id: "deepseek", name: "DeepSeek", url: "https://chat.deepseek.com/" },
    "groq" => Platform { id: "groq", name: "Groq", url: "https://groq.com/" },
    "mistral" => Platform { id: "mistral", name: "Mistral", url: "https://chat.mistral.ai/" },
    "pi" => Platform { id: "pi", name: "Pi", url: "https://pi.ai/" },
    "huggingface" => Platform { id: "huggingface", name: "HuggingChat", url: "https://huggingface.co/chat/" },
    "openrouter" => Platform { id: "openrouter", name: "OpenRouter", url: "https://openrouter.ai/chat/" },
    "poe" => Platform { id: "poe", name: "Poe", url: "https://poe.com/" },
    "cline" => Platform { id: "cline", name: "Cline", url: "https://cline.bot/" },
    "cursor" => Platform { id: "cursor", name: "Cursor", url: "https://www.cursor.com/" },
    "blackbox" => Platform { id: "blackbox", name: "Blackbox", url: "https://www.blackbox.ai/" },
    "phind" => Platform { id: "phind", name: "Phind", url: "https://www.phind.com/" },
    "replit" => Platform { id: "replit", name: "Replit", url: "https://replit.com/" },
    "ideogram" => Platform { id: "ideogram", name: "Ideogram", url: "https://ideogram.ai/" },
    "midjourney" => Platform { id: "midjourney", name: "Midjourney", url: "https://www.midjourney.com/" },
    "leonardo" => Platform { id: "leonardo", name: "Leonardo", url: "https://leonardo.ai/" },
    "you" => Platform { id: "you", name: "You.com", url: "https://you.com/" },
    "andi" => Platform { id: "andi", name: "Andi", url: "https://andisearch.com/" },
};

/// 按标识查找平台
pub fn lookup(platform_id: &str) -> Option<&'static Platform> {
    PLATFORMS.get(platform_id)
}

/// 所有平台（按标识排序）
pub fn all() -> Vec<&'static Platform> {
    let mut platforms: Vec<_> = PLATFORMS.values().collect();
    platforms.sort_by_key(|p| p.id);
    platforms
}

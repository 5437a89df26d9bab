//! 运营群组文本解析：指令与降级路径
//!
//! 主路径是回复登记过的消息（见 `handoff`）；这里只处理
//! `/cerrar`、`/enviar` 指令，以及 "<号码> <正文>" 前缀和被回复原文中的 "(+号码)"。

use std::sync::OnceLock;

use regex::Regex;

use super::session::CustomerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// /cerrar <号码>：关闭客户会话；号码缺失时为 None
    Close(Option<CustomerId>),
    /// /enviar <号码> <正文>：直接发给客户；格式不对时为 None
    Send(Option<(CustomerId, String)>),
}

static PREFIX_RE: OnceLock<Regex> = OnceLock::new();
static QUOTED_RE: OnceLock<Regex> = OnceLock::new();
static ID_RE: OnceLock<Regex> = OnceLock::new();

fn prefix_re() -> &'static Regex {
    PREFIX_RE.get_or_init(|| Regex::new(r"(?s)^\+?(\d{6,20})\s+(.*\S.*)$").expect("static regex"))
}

fn quoted_re() -> &'static Regex {
    QUOTED_RE.get_or_init(|| Regex::new(r"\(\+?(\d{6,20})\)").expect("static regex"))
}

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^\+?\d{6,20}$").expect("static regex"))
}

/// 指令名可能带 @BotName 后缀（群组中常见）
fn command_name(token: &str) -> &str {
    token.split('@').next().unwrap_or(token)
}

pub fn parse_command(text: &str) -> Option<OperatorCommand> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };

    match command_name(head) {
        "/cerrar" => {
            let id = rest
                .split_whitespace()
                .next()
                .filter(|t| id_re().is_match(t))
                .map(CustomerId::new);
            Some(OperatorCommand::Close(id))
        }
        "/enviar" => Some(OperatorCommand::Send(parse_prefixed(rest))),
        _ => None,
    }
}

/// "<号码> <正文>"
pub fn parse_prefixed(text: &str) -> Option<(CustomerId, String)> {
    let caps = prefix_re().captures(text.trim())?;
    let id = caps.get(1)?.as_str();
    let body = caps.get(2)?.as_str().trim();
    Some((CustomerId::new(id), body.to_string()))
}

/// 从被回复消息原文中找 "(+号码)"
pub fn parse_quoted_customer(quoted: &str) -> Option<CustomerId> {
    quoted_re()
        .captures(quoted)
        .and_then(|c| c.get(1))
        .map(|m| CustomerId::new(m.as_str()))
}

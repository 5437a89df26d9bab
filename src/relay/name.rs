//! 从客户回复中提取姓名
//!
//! 规则：出现第一人称标记（soy / me llamo / mi nombre es …）时取其后的部分；
//! 否则取前两个非停用词的字母词。候选需通过合理性过滤才被接受。

use std::sync::OnceLock;

use regex::Regex;

const MIN_NAME_CHARS: usize = 2;
const MAX_NAME_CHARS: usize = 40;
const MAX_NAME_TOKENS: usize = 4;
const FALLBACK_TOKENS: usize = 2;

/// 常见的非姓名词（问候、客套、菜单指令、高频动词）
const STOPWORDS: &[&str] = &[
    "hola", "holaa", "buenas", "buenos", "buen", "dia", "día", "dias", "días", "tarde", "tardes",
    "noche", "noches", "gracias", "saludos", "que", "qué", "tal", "como", "cómo", "estas",
    "estás", "si", "sí", "no", "ok", "oka", "dale", "bien", "hey", "hi", "hello", "menu", "menú",
    "info", "informacion", "información", "consulta", "consultar", "quiero", "quisiera",
    "necesito", "busco", "trabajo", "trabajar", "cv", "precio", "precios", "ayuda", "por",
    "favor", "de", "del", "la", "el", "los", "las", "y", "e", "o", "a", "en", "un", "una", "con",
    "para", "mi", "me", "soy", "llamo", "nombre", "es", "salir", "the", "and", "my", "name",
    "is", "i", "am", "yes",
];

static MARKER_RE: OnceLock<Regex> = OnceLock::new();

fn marker_re() -> &'static Regex {
    MARKER_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^\p{L}])(?:mi nombre es|me llamo|my name is|soy|i am|i'm)\s+(.+)$")
            .expect("static regex")
    })
}

fn is_stopword(token: &str) -> bool {
    let lower = token.to_lowercase();
    STOPWORDS.contains(&lower.as_str())
}

/// 字母词：只含字母、连字符、撇号，且至少一个字母
fn is_alpha_token(token: &str) -> bool {
    token.chars().any(char::is_alphabetic)
        && token
            .chars()
            .all(|c| c.is_alphabetic() || c == '-' || c == '\'')
}

fn clean_token(raw: &str) -> &str {
    raw.trim_matches(|c: char| !(c.is_alphabetic() || c == '-' || c == '\'' || c.is_ascii_digit()))
}

fn capitalize(token: &str) -> String {
    token
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// 标记之后的部分：截到第一个标点，连续取姓名词，遇到停用词或非字母词即停
fn tokens_after_marker(rest: &str) -> Vec<String> {
    let clause = rest
        .split(|c: char| matches!(c, ',' | '.' | ';' | ':' | '!' | '?' | '¡' | '¿' | '\n'))
        .next()
        .unwrap_or_default();

    let mut tokens = Vec::new();
    for raw in clause.split_whitespace() {
        let token = clean_token(raw);
        if token.is_empty() || !is_alpha_token(token) || is_stopword(token) {
            break;
        }
        tokens.push(token.to_string());
        if tokens.len() > MAX_NAME_TOKENS {
            break;
        }
    }
    tokens
}

fn leading_name_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(clean_token)
        .filter(|t| !t.is_empty() && is_alpha_token(t) && !is_stopword(t))
        .take(FALLBACK_TOKENS)
        .map(String::from)
        .collect()
}

/// 姓名合理性：长度 2–40、至多 4 个词、只含字母/空格/连字符/撇号、无停用词
pub fn is_plausible_name(candidate: &str) -> bool {
    let len = candidate.chars().count();
    if !(MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&len) {
        return false;
    }
    let tokens: Vec<&str> = candidate.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() > MAX_NAME_TOKENS {
        return false;
    }
    tokens
        .iter()
        .all(|t| is_alpha_token(t) && !is_stopword(t))
}

/// 提取姓名；无合理候选时返回 None
pub fn extract_name(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let tokens = match marker_re().captures(text).and_then(|c| c.get(1)) {
        Some(rest) => tokens_after_marker(rest.as_str()),
        None => leading_name_tokens(text),
    };

    let candidate = tokens
        .iter()
        .map(|t| capitalize(t))
        .collect::<Vec<_>>()
        .join(" ");

    is_plausible_name(&candidate).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_soy_takes_remainder() {
        assert_eq!(extract_name("Soy Juan Pérez"), Some("Juan Pérez".to_string()));
        assert_eq!(extract_name("soy carla"), Some("Carla".to_string()));
    }

    #[test]
    fn test_other_markers() {
        assert_eq!(extract_name("Me llamo Ana"), Some("Ana".to_string()));
        assert_eq!(
            extract_name("Hola! mi nombre es María José, quiero info"),
            Some("María José".to_string())
        );
        assert_eq!(extract_name("Buenas tardes, soy Pedro!"), Some("Pedro".to_string()));
    }

    #[test]
    fn test_marker_stops_at_stopword() {
        assert_eq!(extract_name("me llamo Ana y quiero trabajar"), Some("Ana".to_string()));
        assert_eq!(extract_name("soy de Burzaco"), None);
    }

    #[test]
    fn test_single_token_name() {
        assert_eq!(extract_name("Ana"), Some("Ana".to_string()));
    }

    #[test]
    fn test_greeting_only_is_rejected() {
        assert_eq!(extract_name("hola"), None);
        assert_eq!(extract_name("Buenas tardes"), None);
        assert_eq!(extract_name("quiero info"), None);
    }

    #[test]
    fn test_fallback_takes_first_two_name_tokens() {
        assert_eq!(extract_name("Hola Carla Gómez Ruiz"), Some("Carla Gómez".to_string()));
        assert_eq!(extract_name("jose-luis 123"), Some("Jose-Luis".to_string()));
    }

    #[test]
    fn test_rejects_non_alphabetic_and_short() {
        assert_eq!(extract_name("12345"), None);
        assert_eq!(extract_name("A"), None);
        assert_eq!(extract_name(""), None);
        assert_eq!(extract_name("👋"), None);
    }

    #[test]
    fn test_plausibility_limits() {
        assert!(is_plausible_name("Juan Pérez"));
        assert!(!is_plausible_name("Uno Dos Tres Cuatro Cinco"));
        assert!(!is_plausible_name(&"a".repeat(41)));
        assert!(!is_plausible_name("Hola"));
    }
}

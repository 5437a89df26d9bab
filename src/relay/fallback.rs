//! 助手不可用时的静态兜底回答（简单关键词匹配）

use crate::config::BusinessSection;

const ZONE_KEYWORDS: &[&str] = &["zona", "zonas", "dónde", "donde", "barrio", "caba", "gba"];
const PRICE_KEYWORDS: &[&str] = &["precio", "cuánto", "cuanto", "pagan", "costo", "tarifa", "valor"];
const HOURS_KEYWORDS: &[&str] = &["horario", "atienden", "abren"];
const APPLY_KEYWORDS: &[&str] = &["cv", "postular", "postulo", "trabajar", "empleo", "currículum"];

fn mentions(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// 按关键词挑选兜底回答，永远返回非空文本
pub fn fallback_answer(business: &BusinessSection, text: &str) -> String {
    let low = text.to_lowercase();
    if mentions(&low, ZONE_KEYWORDS) {
        format!("Trabajamos en {}. Contanos tu barrio y te confirmamos.", business.zones)
    } else if mentions(&low, PRICE_KEYWORDS) {
        "Los costos varían según la prestación. Si querés, un representante te asesora (opción 6)."
            .to_string()
    } else if mentions(&low, HOURS_KEYWORDS) {
        format!("Nuestro horario de atención es {}.", business.hours)
    } else if mentions(&low, APPLY_KEYWORDS) {
        format!(
            "Podés enviar tu CV a {} o completar el formulario (opción 4).",
            business.email
        )
    } else {
        "Gracias por tu consulta. Si querés info precisa, podés hablar con un representante (opción 6)."
            .to_string()
    }
}

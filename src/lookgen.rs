use crate::extract::{ExtractClient, ExtractError};
use crate::models::GeneratedLook;
use crate::prompts::LOOK_CREATION_PROMPT;
use once_cell::sync::Lazy;
use tracing::info;

static LOOK_MODEL: Lazy<String> =
    Lazy::new(|| std::env::var("LOOK_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string()));

/// Turns a free-text styling request into a structured look. One structured
/// call against the transport client; no retry or fallback machinery beyond
/// what the client itself provides.
pub async fn generate_look(
    client: &ExtractClient,
    request: &str,
) -> Result<GeneratedLook, ExtractError> {
    let prompt = LOOK_CREATION_PROMPT.replace("{request}", request);
    let look: GeneratedLook = client.parse_structured(&LOOK_MODEL, &prompt).await?;
    info!(
        target = "stylist.lookgen",
        sex = ?look.sex,
        slots = look.parts().iter().map(|(_, items)| items.len()).sum::<usize>(),
        "look generated"
    );
    Ok(look)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;

    #[test]
    fn prompt_carries_the_user_request() {
        let prompt = LOOK_CREATION_PROMPT.replace("{request}", "date night in autumn");
        assert!(prompt.contains("date night in autumn"));
        assert!(!prompt.contains("{request}"));
    }

    #[test]
    fn look_payload_accepts_sparse_parts() {
        let look: GeneratedLook = serde_json::from_value(serde_json::json!({
            "sex": "female",
            "season": "demi",
            "top": [{"category": "blouse", "color": "white"}],
            "bottom": [{"category": "jeans", "color": ["blue", "indigo"]}],
            "shoes": [{"category": "loafers"}]
        }))
        .unwrap();
        assert_eq!(look.sex, Gender::Female);
        assert_eq!(look.top.len(), 1);
        assert!(look.full.is_empty());
        assert_eq!(
            look.bottom[0].color.as_ref().unwrap().tokens(),
            vec!["blue", "indigo"]
        );
    }
}

//! AI product recommendations and the shopping assistant.
//!
//! Every AI path has a deterministic fallback, except the chatbot which
//! answers 503 when no model is configured.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, Product};
use crate::error::{AppError, Result};
use crate::services::ai::{extract_json_array, ChatRole, ChatTurn};
use crate::services::email::format_vnd;
use crate::state::AppState;
use crate::store::ProductQuery;

pub const DEFAULT_LIMIT: usize = 6;
pub const MAX_LIMIT: usize = 20;
/// In-stock products shown to the model.
const SNAPSHOT_SIZE: u32 = 50;
const CHAT_SNAPSHOT_SIZE: u32 = 30;
const MAX_HISTORY_TURNS: usize = 10;

const RECOMMEND_SYSTEM_PROMPT: &str = "You are a product recommendation engine for an online store. \
Reply with a JSON array of product ids taken from the catalog you are given, best match first. \
Do not add any other text.";

/// Where a recommendation list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Ai,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub source: Source,
    pub products: Vec<Product>,
}

#[instrument(skip(state))]
pub async fn recommend_for_user(state: &AppState, user_id: Uuid, limit: usize) -> Result<Recommendations> {
    let store = state.store();
    let orders = store.orders_for_user(user_id).await?;
    let purchased_ids: HashSet<Uuid> = orders
        .iter()
        .filter(|o| o.status != OrderStatus::Cancelled)
        .flat_map(|o| o.items.iter().map(|i| i.product_id))
        .collect();
    let purchased = store.products_by_ids(&purchased_ids.iter().copied().collect::<Vec<_>>()).await?;

    let candidates: Vec<Product> =
        snapshot(state, SNAPSHOT_SIZE).await?.into_iter().filter(|p| !purchased_ids.contains(&p.id)).collect();

    if !candidates.is_empty() {
        let history = if purchased.is_empty() {
            "The customer has not bought anything yet; suggest popular, broadly appealing products.".to_string()
        } else {
            format!("The customer previously bought:\n{}", catalog_lines(&purchased))
        };
        let prompt = format!(
            "{history}\n\nCatalog:\n{}\n\nRecommend up to {limit} products from the catalog.",
            catalog_lines(&candidates)
        );
        if let Some(products) = ask_for_products(state, &prompt, &candidates, limit).await {
            return Ok(Recommendations { source: Source::Ai, products });
        }
    }

    let categories: HashSet<Uuid> = purchased.iter().filter_map(|p| p.category_id).collect();
    let (mut related, others): (Vec<Product>, Vec<Product>) =
        candidates.into_iter().partition(|p| p.category_id.is_some_and(|c| categories.contains(&c)));
    related.extend(others);
    related.truncate(limit);
    Ok(Recommendations { source: Source::Fallback, products: related })
}

#[instrument(skip(state))]
pub async fn similar_products(state: &AppState, product_id: Uuid, limit: usize) -> Result<Recommendations> {
    let store = state.store();
    let product = store.product_by_id(product_id).await?.ok_or_else(|| AppError::not_found("Product"))?;

    let candidates: Vec<Product> =
        snapshot(state, SNAPSHOT_SIZE).await?.into_iter().filter(|p| p.id != product.id).collect();
    if !candidates.is_empty() {
        let prompt = format!(
            "The customer is looking at:\n{}\n\nCatalog:\n{}\n\nRecommend up to {limit} similar products from the catalog.",
            catalog_lines(std::slice::from_ref(&product)),
            catalog_lines(&candidates)
        );
        if let Some(products) = ask_for_products(state, &prompt, &candidates, limit).await {
            return Ok(Recommendations { source: Source::Ai, products });
        }
    }

    let products = match product.category_id {
        Some(category_id) => {
            let query = ProductQuery {
                category_id: Some(category_id),
                in_stock_only: true,
                page: 1,
                limit: (limit + 1) as u32,
                ..Default::default()
            };
            store
                .search_products(&query)
                .await?
                .items
                .into_iter()
                .filter(|p| p.id != product.id)
                .take(limit)
                .collect()
        }
        None => vec![],
    };
    Ok(Recommendations { source: Source::Fallback, products })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[instrument(skip(state, message, history), fields(history = history.len()))]
pub async fn chat(state: &AppState, message: &str, history: &[ChatMessage]) -> Result<String> {
    let ai = state.ai().ok_or_else(|| AppError::ServiceUnavailable("The shopping assistant is not available".into()))?;

    let catalog = snapshot(state, CHAT_SNAPSHOT_SIZE).await?;
    let system = format!(
        "You are a friendly shopping assistant for an online store. Answer briefly, in the customer's language. \
         Only recommend products from this catalog and quote prices exactly:\n{}",
        catalog_lines(&catalog)
    );

    let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
    let mut turns: Vec<ChatTurn> = history
        .iter()
        .skip(skip)
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| match m.role.as_str() {
            "assistant" | "model" | "bot" => ChatTurn { role: ChatRole::Model, text: m.content.clone() },
            _ => ChatTurn::user(m.content.clone()),
        })
        .collect();
    turns.push(ChatTurn::user(message));

    ai.generate(Some(&system), &turns).await.map_err(|e| {
        tracing::warn!(error = %e, "Chatbot generation failed");
        AppError::ServiceUnavailable("The shopping assistant is temporarily unavailable".into())
    })
}

async fn snapshot(state: &AppState, size: u32) -> Result<Vec<Product>> {
    let query = ProductQuery { in_stock_only: true, page: 1, limit: size, ..Default::default() };
    Ok(state.store().search_products(&query).await?.items)
}

/// Asks the model and keeps the ids it returned that are real candidates.
/// `None` when the AI is off, fails, or returns nothing usable.
async fn ask_for_products(state: &AppState, prompt: &str, candidates: &[Product], limit: usize) -> Option<Vec<Product>> {
    let ai = state.ai()?;
    let reply = match ai.generate(Some(RECOMMEND_SYSTEM_PROMPT), &[ChatTurn::user(prompt)]).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "Recommendation request failed, using fallback");
            return None;
        }
    };
    let picked = pick_products(&reply, candidates, limit);
    if picked.is_empty() {
        tracing::debug!("Model reply contained no usable product ids");
        return None;
    }
    Some(picked)
}

/// Maps ids from a model reply onto `candidates`, in reply order, without duplicates.
pub fn pick_products(reply: &str, candidates: &[Product], limit: usize) -> Vec<Product> {
    let Some(values) = extract_json_array(reply) else { return vec![] };
    let mut seen = HashSet::new();
    values
        .iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => Uuid::parse_str(s.trim()).ok(),
            serde_json::Value::Object(o) => o.get("id").and_then(|id| id.as_str()).and_then(|s| Uuid::parse_str(s).ok()),
            _ => None,
        })
        .filter(|id| seen.insert(*id))
        .filter_map(|id| candidates.iter().find(|p| p.id == id).cloned())
        .take(limit)
        .collect()
}

fn catalog_lines(products: &[Product]) -> String {
    products
        .iter()
        .map(|p| {
            let brand = p.brand.as_deref().map(|b| format!(" | brand: {b}")).unwrap_or_default();
            format!("- id: {} | {} | {}{brand} | stock: {}", p.id, p.name, format_vnd(p.price), p.stock)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ProductDraft;

    fn product(name: &str) -> Product {
        Product::create(ProductDraft { name: name.into(), price: 10_000, stock: 3, ..Default::default() })
    }

    #[test]
    fn test_pick_products_keeps_reply_order() {
        let (a, b, c) = (product("A"), product("B"), product("C"));
        let candidates = vec![a.clone(), b.clone(), c.clone()];
        let reply = format!("```json\n[\"{}\", \"{}\", \"{}\", \"{}\"]\n```", c.id, Uuid::now_v7(), a.id, c.id);

        let picked = pick_products(&reply, &candidates, 5);
        assert_eq!(picked.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["C", "A"]);
        assert_eq!(pick_products(&reply, &candidates, 1).len(), 1);
    }

    #[test]
    fn test_pick_products_accepts_objects() {
        let a = product("A");
        let reply = format!(r#"[{{"id": "{}", "reason": "popular"}}]"#, a.id);
        assert_eq!(pick_products(&reply, std::slice::from_ref(&a), 3), vec![a]);
    }

    #[test]
    fn test_pick_products_garbage() {
        assert!(pick_products("no idea", &[product("A")], 3).is_empty());
        assert!(pick_products("[1, 2, 3]", &[product("A")], 3).is_empty());
    }

    #[test]
    fn test_catalog_lines() {
        let mut p = product("Tea");
        p.brand = Some("Phuc Long".into());
        let line = catalog_lines(&[p.clone()]);
        assert_eq!(line, format!("- id: {} | Tea | 10.000 ₫ | brand: Phuc Long | stock: 3", p.id));
    }
}

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{info, instrument, warn};

use crate::ai::AiParser;
use crate::batch;
use crate::cache::ProductCache;
use crate::callback::Command;
use crate::config::Config;
use crate::db::{self, GroceryItem};
use crate::error::Error;
use crate::model::{Category, ItemStatus, ParsedItem, CATEGORIES};
use crate::pipeline;
use crate::session::{self, NavView, SessionState};
use crate::shopping::{self, GroupedList};

const MSG_STALE: &str = "Action expirée.";
const MSG_RETRY: &str = "Erreur, réessaie.";

#[instrument(skip_all)]
pub async fn handle_message(
    bot: Bot,
    msg: Message,
    pool: SqlitePool,
    cache: Arc<ProductCache>,
    ai: Arc<dyn AiParser>,
    cfg: Arc<Config>,
) -> Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let allowed = &cfg.telegram.allowed_users;
    if !allowed.is_empty() && !allowed.contains(&(user.id.0 as i64)) {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        let _ = bot
            .send_message(msg.chat.id, "Envoie-moi ta liste en texte.")
            .await;
        return Ok(());
    };
    let trimmed = text.trim();

    match trimmed {
        "/start" => {
            let _ = bot
                .send_message(
                    msg.chat.id,
                    "Envoie-moi une liste de courses (un article par ligne, \
                     quantité avant ou après le nom) et je la range par rayon.\n\
                     /liste — faire les courses\n/ping — vérifier que je suis là",
                )
                .await;
            return Ok(());
        }
        "/ping" => {
            let _ = bot.send_message(msg.chat.id, "PONG").await;
            return Ok(());
        }
        "/liste" | "/list" => {
            if let Err(err) = open_shopping_list(&bot, &msg, &pool, &cfg).await {
                warn!(?err, "failed to open shopping list");
                let _ = bot.send_message(msg.chat.id, MSG_RETRY).await;
            }
            return Ok(());
        }
        _ if trimmed.starts_with('/') => {
            let _ = bot.send_message(msg.chat.id, "Commande inconnue.").await;
            return Ok(());
        }
        _ => {}
    }

    // Free text: parse into a tentative batch and offer confirmation.
    let parsed = match pipeline::parse_for_batch(&cache, ai.as_ref(), trimmed).await {
        Ok(parsed) => parsed,
        Err(Error::ParsingFailed(reason)) => {
            warn!(reason, "parsing failed");
            let _ = bot
                .send_message(msg.chat.id, "⚠️ Je n'ai pas réussi à analyser ta liste. Réessaie.")
                .await;
            return Ok(());
        }
        Err(err) => {
            warn!(?err, "failed to parse submission");
            let _ = bot.send_message(msg.chat.id, MSG_RETRY).await;
            return Ok(());
        }
    };
    if parsed.is_empty() {
        let _ = bot
            .send_message(msg.chat.id, "Je n'ai reconnu aucun article.")
            .await;
        return Ok(());
    }

    let (batch_id, items) = match batch::create_batch(&pool, &parsed).await {
        Ok(created) => created,
        Err(err) => {
            warn!(?err, "failed to create batch");
            let _ = bot.send_message(msg.chat.id, MSG_RETRY).await;
            return Ok(());
        }
    };
    if items.is_empty() {
        let _ = bot
            .send_message(msg.chat.id, "Je n'ai reconnu aucun article.")
            .await;
        return Ok(());
    }
    info!(batch_id, count = items.len(), "batch awaiting confirmation");

    // Send first so the session can be keyed to the real message id, then
    // edit the token-bearing keyboard in.
    let sent = bot.send_message(msg.chat.id, confirm_text(&items)).await?;
    let token = session::new_token();
    let lines = original_lines(&parsed, &items);
    let state = SessionState::Confirm {
        batch_id: batch_id.clone(),
        lines,
        editing: None,
    };
    let bound = db::create_session(
        &pool,
        &token,
        sent.id.0 as i64,
        &state.to_json()?,
        cfg.app.session_ttl_hours as i64,
    )
    .await;
    if let Err(err) = bound {
        // The list went out but its buttons can never resolve; replace it
        // with the retry notice and drop the unreachable confirming rows.
        warn!(?err, "failed to bind confirmation session");
        if let Err(err) = batch::cancel_batch(&pool, &batch_id).await {
            warn!(?err, "failed to discard unbound batch");
        }
        let _ = bot.edit_message_text(sent.chat.id, sent.id, MSG_RETRY).await;
        return Ok(());
    }
    bot.edit_message_reply_markup(sent.chat.id, sent.id)
        .reply_markup(confirm_keyboard(&token, &items))
        .await?;
    Ok(())
}

/// Pair each created item with the raw input line it came from. Items are
/// inserted in parse order, skipping blank names, so zipping the filtered
/// parse output with the created rows lines them up.
fn original_lines(parsed: &[ParsedItem], items: &[GroceryItem]) -> HashMap<i64, String> {
    parsed
        .iter()
        .filter(|p| !p.name.trim().is_empty())
        .zip(items)
        .map(|(p, item)| (item.id, p.original_line.clone()))
        .collect()
}

async fn open_shopping_list(
    bot: &Bot,
    msg: &Message,
    pool: &SqlitePool,
    cfg: &Config,
) -> Result<()> {
    let list = shopping::list_by_category(pool).await?;
    if list.is_empty() {
        let _ = bot
            .send_message(msg.chat.id, "Ta liste est vide. Envoie-moi des articles !")
            .await;
        return Ok(());
    }
    let sent = bot
        .send_message(msg.chat.id, category_list_text(&list))
        .await?;
    let token = session::new_token();
    let state = SessionState::Shopping {
        nav: NavView::CategoryList,
    };
    db::create_session(
        pool,
        &token,
        sent.id.0 as i64,
        &state.to_json()?,
        cfg.app.session_ttl_hours as i64,
    )
    .await?;
    bot.edit_message_reply_markup(sent.chat.id, sent.id)
        .reply_markup(category_list_keyboard(&token, &list))
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    pool: SqlitePool,
    cache: Arc<ProductCache>,
) -> Result<()> {
    // Every press gets an answer, even the ones we cannot act on.
    let answer = |toast: Option<String>| {
        let bot = bot.clone();
        let id = q.id.clone();
        async move {
            let mut req = bot.answer_callback_query(id);
            if let Some(text) = toast {
                req = req.text(text);
            }
            if let Err(err) = req.await {
                warn!(?err, "failed to answer callback");
            }
        }
    };

    let Some(message) = q.message.clone() else {
        answer(Some(MSG_STALE.into())).await;
        return Ok(());
    };
    let Some(cmd) = q.data.as_deref().and_then(Command::decode) else {
        answer(Some(MSG_STALE.into())).await;
        return Ok(());
    };

    let session_row = match db::get_session(&pool, cmd.token()).await {
        Ok(row) => row,
        Err(err) => {
            warn!(?err, "failed to load session");
            answer(Some(MSG_RETRY.into())).await;
            return Ok(());
        }
    };
    let Some(session_row) = session_row else {
        // Token expired or purged: neutralize the dead keyboard.
        let _ = bot
            .edit_message_reply_markup(message.chat.id, message.id)
            .await;
        answer(Some(MSG_STALE.into())).await;
        return Ok(());
    };
    if session_row.message_id != message.id.0 as i64 {
        answer(Some(MSG_STALE.into())).await;
        return Ok(());
    }
    let Ok(state) = SessionState::from_json(&session_row.data) else {
        warn!(token = %session_row.id, "corrupt session payload");
        answer(Some(MSG_STALE.into())).await;
        return Ok(());
    };

    let outcome = dispatch(&bot, &message, &pool, &cache, &cmd, state).await;
    match outcome {
        Ok(toast) => answer(toast).await,
        Err(err) if err.is_not_found() => answer(Some(MSG_STALE.into())).await,
        Err(err) => {
            warn!(?err, "callback dispatch failed");
            answer(Some(MSG_RETRY.into())).await;
        }
    }
    Ok(())
}

/// Apply one decoded command against its session state and re-render the
/// message. Returns the toast to show, if any.
async fn dispatch(
    bot: &Bot,
    message: &Message,
    pool: &SqlitePool,
    cache: &ProductCache,
    cmd: &Command,
    state: SessionState,
) -> crate::error::Result<Option<String>> {
    match (cmd, state) {
        (
            Command::ConfirmItem { token, item_id },
            SessionState::Confirm {
                batch_id, lines, ..
            },
        ) => {
            let item = batch::confirm_item(pool, &batch_id, *item_id).await?;
            learn(cache, &item, lines.get(item_id)).await;
            render_confirm(bot, message, pool, token, &batch_id, lines, None).await?;
            Ok(Some(format!("✅ {}", item.name)))
        }
        (
            Command::ConfirmAll { token },
            SessionState::Confirm {
                batch_id, lines, ..
            },
        ) => {
            let committed = batch::confirm_all(pool, &batch_id).await?;
            for item in &committed {
                learn(cache, item, lines.get(&item.id)).await;
            }
            render_confirm(bot, message, pool, token, &batch_id, lines, None).await?;
            Ok(Some(format!("✅ {} article(s) ajoutés", committed.len())))
        }
        (Command::CancelBatch { token }, SessionState::Confirm { batch_id, .. }) => {
            let deleted = batch::cancel_batch(pool, &batch_id).await?;
            finalize_message(bot, message, pool, token, "❌ Ajout annulé.").await?;
            Ok(Some(format!("{deleted} article(s) supprimés")))
        }
        (
            Command::EditItem { token, item_id },
            SessionState::Confirm {
                batch_id,
                lines,
                editing,
            },
        ) => {
            // Tapping ✏️ again closes the editor.
            let editing = if editing == Some(*item_id) {
                None
            } else {
                Some(*item_id)
            };
            render_confirm(bot, message, pool, token, &batch_id, lines, editing).await?;
            Ok(None)
        }
        (
            Command::QtyUp { token } | Command::QtyDown { token },
            SessionState::Confirm {
                batch_id,
                lines,
                editing: Some(item_id),
            },
        ) => {
            let item = db::get_item(pool, item_id).await?.ok_or(Error::NotFound)?;
            let delta = if matches!(cmd, Command::QtyUp { .. }) { 1 } else { -1 };
            let updated = batch::edit_item(
                pool,
                item_id,
                item.category,
                item.quantity + delta,
                item.note.as_deref(),
            )
            .await?;
            render_confirm(bot, message, pool, token, &batch_id, lines, Some(item_id)).await?;
            Ok(Some(format!("{}× {}", updated.quantity, updated.name)))
        }
        (
            Command::SetCategory { token, index },
            SessionState::Confirm {
                batch_id,
                lines,
                editing: Some(item_id),
            },
        ) => {
            let category = Category::from_index(*index).ok_or(Error::NotFound)?;
            let item = db::get_item(pool, item_id).await?.ok_or(Error::NotFound)?;
            batch::edit_item(pool, item_id, category, item.quantity, item.note.as_deref())
                .await?;
            render_confirm(bot, message, pool, token, &batch_id, lines, None).await?;
            Ok(Some(format!("{} {}", category.emoji(), category.as_str())))
        }
        (
            Command::OpenCategory { token, index },
            SessionState::Shopping { .. },
        ) => {
            let category = Category::from_index(*index).ok_or(Error::NotFound)?;
            render_shopping(bot, message, pool, token, NavView::CategoryDetail { category })
                .await?;
            Ok(None)
        }
        (Command::BackToCategories { token }, SessionState::Shopping { .. }) => {
            render_shopping(bot, message, pool, token, NavView::CategoryList).await?;
            Ok(None)
        }
        (Command::TapItem { token, item_id }, SessionState::Shopping { nav }) => {
            let new_status = shopping::advance_status(pool, *item_id).await?;
            render_shopping(bot, message, pool, token, nav).await?;
            Ok(Some(status_toast(new_status).to_string()))
        }
        (Command::MarkNotFound { token, item_id }, SessionState::Shopping { nav }) => {
            shopping::mark_not_found(pool, *item_id).await?;
            render_shopping(bot, message, pool, token, nav).await?;
            Ok(Some("🚫 Introuvable".into()))
        }
        (Command::ClearFound { token }, SessionState::Shopping { .. }) => {
            let deleted = shopping::clear_found(pool).await?;
            render_shopping(bot, message, pool, token, NavView::CategoryList).await?;
            Ok(Some(format!("🧹 {deleted} article(s) retirés")))
        }
        (Command::ClearSelection { token }, SessionState::Shopping { .. }) => {
            let reset = shopping::clear_selection(pool).await?;
            render_shopping(bot, message, pool, token, NavView::CategoryList).await?;
            Ok(Some(format!("🔄 {reset} sélection(s) annulées")))
        }
        (Command::CloseList { token }, SessionState::Shopping { .. }) => {
            finalize_message(bot, message, pool, token, "📝 Bonnes courses !").await?;
            Ok(None)
        }
        // Command does not fit the session it references: stale button.
        _ => Err(Error::NotFound),
    }
}

/// Cache assimilation on confirm. Sentinel-categorized items are not
/// learned: caching them would pin the unknown category and stop future
/// submissions from reaching the AI.
async fn learn(cache: &ProductCache, item: &GroceryItem, original_line: Option<&String>) {
    if item.category == Category::Inconnu {
        return;
    }
    let Some(line) = original_line else {
        return;
    };
    if let Err(err) = pipeline::assimilate(cache, &item.name, item.category, line).await {
        warn!(?err, item = %item.name, "failed to record cache variant");
    }
}

/// Re-render a confirmation message from the store's current state; when
/// nothing is left to confirm, collapse it to a summary and drop the
/// session.
#[allow(clippy::too_many_arguments)]
async fn render_confirm(
    bot: &Bot,
    message: &Message,
    pool: &SqlitePool,
    token: &str,
    batch_id: &str,
    lines: HashMap<i64, String>,
    editing: Option<i64>,
) -> crate::error::Result<()> {
    let remaining = db::list_confirming(pool, batch_id).await?;
    if remaining.is_empty() {
        finalize_message(bot, message, pool, token, "✅ Articles ajoutés à la liste !").await?;
        return Ok(());
    }

    let state = SessionState::Confirm {
        batch_id: batch_id.to_string(),
        lines,
        editing,
    };
    let data = state
        .to_json()
        .map_err(|e| Error::ParsingFailed(e.to_string()))?;
    db::update_session_data(pool, token, &data).await?;

    let editing_item = match editing {
        Some(id) => remaining.iter().find(|i| i.id == id).cloned(),
        None => None,
    };
    let (text, keyboard) = match editing_item {
        Some(item) => (edit_text(&item), edit_keyboard(token, &item)),
        None => (confirm_text(&remaining), confirm_keyboard(token, &remaining)),
    };
    if let Err(err) = bot
        .edit_message_text(message.chat.id, message.id, text)
        .reply_markup(keyboard)
        .await
    {
        // "Message is not modified" is a benign race with double taps.
        warn!(?err, "failed to edit confirmation message");
    }
    Ok(())
}

async fn render_shopping(
    bot: &Bot,
    message: &Message,
    pool: &SqlitePool,
    token: &str,
    view: NavView,
) -> crate::error::Result<()> {
    let list = shopping::list_by_category(pool).await?;

    // Drilling into a category that just emptied falls back to the list.
    let view = match view {
        NavView::CategoryDetail { category } if list.items_in(category).is_empty() => {
            NavView::CategoryList
        }
        other => other,
    };

    let state = SessionState::Shopping { nav: view.clone() };
    let data = state
        .to_json()
        .map_err(|e| Error::ParsingFailed(e.to_string()))?;
    db::update_session_data(pool, token, &data).await?;

    let (text, keyboard) = match view {
        NavView::CategoryList => (
            category_list_text(&list),
            category_list_keyboard(token, &list),
        ),
        NavView::CategoryDetail { category } => (
            category_detail_text(category, list.items_in(category)),
            category_detail_keyboard(token, category, list.items_in(category)),
        ),
    };
    if let Err(err) = bot
        .edit_message_text(message.chat.id, message.id, text)
        .reply_markup(keyboard)
        .await
    {
        warn!(?err, "failed to edit shopping message");
    }
    Ok(())
}

/// Replace the message with a final text, drop its keyboard and session.
async fn finalize_message(
    bot: &Bot,
    message: &Message,
    pool: &SqlitePool,
    token: &str,
    text: &str,
) -> crate::error::Result<()> {
    if let Err(err) = bot
        .edit_message_text(message.chat.id, message.id, text)
        .await
    {
        warn!(?err, "failed to finalize message");
    }
    db::delete_session(pool, token).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn status_toast(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Pending => "⬜ À prendre",
        ItemStatus::Selected => "🔵 Sélectionné",
        ItemStatus::Found => "✅ Trouvé",
        ItemStatus::NotFound => "🚫 Introuvable",
        ItemStatus::Confirming => "…",
    }
}

fn status_emoji(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Pending => "⬜",
        ItemStatus::Selected => "🔵",
        ItemStatus::Found => "✅",
        ItemStatus::NotFound => "🚫",
        ItemStatus::Confirming => "⏳",
    }
}

fn confirm_text(items: &[GroceryItem]) -> String {
    let mut out = format!("🛒 Nouveaux articles ({}) :\n\n", items.len());
    for item in items {
        out.push_str(&format!(
            "• {}× {} — {} {}\n",
            item.quantity,
            item.name,
            item.category.emoji(),
            item.category.as_str()
        ));
    }
    out.push_str("\nConfirme chaque article, ou tout d'un coup.");
    out
}

fn confirm_keyboard(token: &str, items: &[GroceryItem]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = items
        .iter()
        .map(|item| {
            vec![
                InlineKeyboardButton::callback(
                    format!("✅ {}× {}", item.quantity, item.name),
                    Command::ConfirmItem {
                        token: token.to_string(),
                        item_id: item.id,
                    }
                    .encode(),
                ),
                InlineKeyboardButton::callback(
                    "✏️",
                    Command::EditItem {
                        token: token.to_string(),
                        item_id: item.id,
                    }
                    .encode(),
                ),
            ]
        })
        .collect();
    rows.push(vec![
        InlineKeyboardButton::callback(
            "✅ Tout confirmer",
            Command::ConfirmAll {
                token: token.to_string(),
            }
            .encode(),
        ),
        InlineKeyboardButton::callback(
            "❌ Annuler",
            Command::CancelBatch {
                token: token.to_string(),
            }
            .encode(),
        ),
    ]);
    InlineKeyboardMarkup::new(rows)
}

fn edit_text(item: &GroceryItem) -> String {
    format!(
        "✏️ {}\n\nQuantité : {}\nRayon : {} {}",
        item.name,
        item.quantity,
        item.category.emoji(),
        item.category.as_str()
    )
}

fn edit_keyboard(token: &str, item: &GroceryItem) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![
        InlineKeyboardButton::callback(
            "➖",
            Command::QtyDown {
                token: token.to_string(),
            }
            .encode(),
        ),
        InlineKeyboardButton::callback(
            "➕",
            Command::QtyUp {
                token: token.to_string(),
            }
            .encode(),
        ),
    ]];
    for pair in CATEGORIES.chunks(2) {
        rows.push(
            pair.iter()
                .map(|category| {
                    let index = CATEGORIES.iter().position(|c| c == category).unwrap_or(0);
                    InlineKeyboardButton::callback(
                        format!("{} {}", category.emoji(), category.as_str()),
                        Command::SetCategory {
                            token: token.to_string(),
                            index,
                        }
                        .encode(),
                    )
                })
                .collect(),
        );
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "« Retour",
        Command::EditItem {
            token: token.to_string(),
            item_id: item.id,
        }
        .encode(),
    )]);
    InlineKeyboardMarkup::new(rows)
}

fn category_list_text(list: &GroupedList) -> String {
    let mut out = format!("📝 Liste de courses — {} article(s)\n", list.active_count());
    for (category, items) in &list.grouped {
        out.push_str(&format!(
            "\n{} {} ({})",
            category.emoji(),
            category.as_str(),
            items.len()
        ));
    }
    if !list.found.is_empty() {
        let names: Vec<&str> = list.found.iter().map(|i| i.name.as_str()).collect();
        out.push_str(&format!("\n\n✅ Trouvés : {}", names.join(", ")));
    }
    out
}

fn category_list_keyboard(token: &str, list: &GroupedList) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = list
        .grouped
        .iter()
        .filter_map(|(category, items)| {
            let index = CATEGORIES.iter().position(|c| c == category)?;
            Some(vec![InlineKeyboardButton::callback(
                format!("{} {} ({})", category.emoji(), category.as_str(), items.len()),
                Command::OpenCategory {
                    token: token.to_string(),
                    index,
                }
                .encode(),
            )])
        })
        .collect();
    let mut controls = Vec::new();
    if !list.found.is_empty() {
        controls.push(InlineKeyboardButton::callback(
            "🧹 Vider trouvés",
            Command::ClearFound {
                token: token.to_string(),
            }
            .encode(),
        ));
    }
    controls.push(InlineKeyboardButton::callback(
        "🔄 Annuler sélection",
        Command::ClearSelection {
            token: token.to_string(),
        }
        .encode(),
    ));
    rows.push(controls);
    rows.push(vec![InlineKeyboardButton::callback(
        "✔️ Terminer",
        Command::CloseList {
            token: token.to_string(),
        }
        .encode(),
    )]);
    InlineKeyboardMarkup::new(rows)
}

fn category_detail_text(category: Category, items: &[GroceryItem]) -> String {
    let mut out = format!("{} {}\n\n", category.emoji(), category.as_str());
    for item in items {
        out.push_str(&format!(
            "{} {}× {}\n",
            status_emoji(item.status),
            item.quantity,
            item.name
        ));
    }
    out.push_str("\nTape un article pour avancer : ⬜ → 🔵 → ✅");
    out
}

fn category_detail_keyboard(
    token: &str,
    _category: Category,
    items: &[GroceryItem],
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = items
        .iter()
        .map(|item| {
            vec![
                InlineKeyboardButton::callback(
                    format!(
                        "{} {}× {}",
                        status_emoji(item.status),
                        item.quantity,
                        item.name
                    ),
                    Command::TapItem {
                        token: token.to_string(),
                        item_id: item.id,
                    }
                    .encode(),
                ),
                InlineKeyboardButton::callback(
                    "🚫",
                    Command::MarkNotFound {
                        token: token.to_string(),
                        item_id: item.id,
                    }
                    .encode(),
                ),
            ]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback(
        "« Rayons",
        Command::BackToCategories {
            token: token.to_string(),
        }
        .encode(),
    )]);
    InlineKeyboardMarkup::new(rows)
}

//! Delivery order flow
//!
//! Identify the customer, let them browse a fixed catalog, collect items into
//! a cart and finish with either a checkout or a cancellation. Both endings
//! are terminal.

use super::{extract_name, Flow, TerminationPhrases, Turn};
use crate::llm::{PromptTemplate, Responder};
use crate::models::{ConversationState, Message, Stage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStage {
    Greeting,
    AwaitName,
    Browsing,
    Cart,
    CheckedOut,
    Cancelled,
}

impl Stage for OrderStage {
    const ALL: &'static [Self] = &[
        OrderStage::Greeting,
        OrderStage::AwaitName,
        OrderStage::Browsing,
        OrderStage::Cart,
        OrderStage::CheckedOut,
        OrderStage::Cancelled,
    ];

    fn initial() -> Self {
        OrderStage::Greeting
    }

    fn tag(&self) -> &'static str {
        match self {
            OrderStage::Greeting => "boas_vindas",
            OrderStage::AwaitName => "identifica_cliente",
            OrderStage::Browsing => "escolher_produtos",
            OrderStage::Cart => "adicionar_itens_carrinho",
            OrderStage::CheckedOut => "finalizar_pedido",
            OrderStage::Cancelled => "cancelar_pedido",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, OrderStage::CheckedOut | OrderStage::Cancelled)
    }

    fn is_open(&self) -> bool {
        matches!(self, OrderStage::Browsing | OrderStage::Cart)
    }
}

//
// ================= Catalog & Cart =================
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub price_cents: u64,
}

impl CatalogItem {
    pub fn new(name: impl Into<String>, price_cents: u64) -> Self {
        Self {
            name: name.into(),
            price_cents,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    /// Default bakery menu
    pub fn bakery() -> Self {
        Self::new(vec![
            CatalogItem::new("Bolo de chocolate", 4500),
            CatalogItem::new("Torta de limão", 3800),
            CatalogItem::new("Brigadeiro", 250),
            CatalogItem::new("Pão de queijo", 450),
            CatalogItem::new("Coxinha", 600),
        ])
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Items whose name appears in `text`, in catalog order.
    pub fn mentioned_in(&self, text: &str) -> Vec<&CatalogItem> {
        let text = text.to_lowercase();
        self.items
            .iter()
            .filter(|item| text.contains(&item.name.to_lowercase()))
            .collect()
    }

    pub fn describe(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("{} ({})", item.name, format_brl(item.price_cents)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::bakery()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub name: String,
    pub unit_price_cents: u64,
    pub quantity: u32,
}

/// Cart carried in the conversation state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderData {
    pub items: Vec<CartLine>,
}

/// Largest quantity a single cart line may hold
pub const MAX_LINE_QUANTITY: u32 = 99;

impl OrderData {
    pub fn quantity_of(&self, name: &str) -> u32 {
        self.items
            .iter()
            .find(|line| line.name == name)
            .map_or(0, |line| line.quantity)
    }

    /// Adds `quantity` units, merging with an existing line.
    /// Returns false, leaving the cart untouched, when the line would exceed
    /// [`MAX_LINE_QUANTITY`].
    pub fn add(&mut self, item: &CatalogItem, quantity: u32) -> bool {
        let merged = self.quantity_of(&item.name).saturating_add(quantity);
        if quantity == 0 || merged > MAX_LINE_QUANTITY {
            return false;
        }
        match self.items.iter_mut().find(|line| line.name == item.name) {
            Some(line) => line.quantity = merged,
            None => self.items.push(CartLine {
                name: item.name.clone(),
                unit_price_cents: item.price_cents,
                quantity,
            }),
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_cents(&self) -> u64 {
        self.items
            .iter()
            .map(|line| line.unit_price_cents.saturating_mul(u64::from(line.quantity)))
            .fold(0u64, u64::saturating_add)
    }

    pub fn summary(&self) -> String {
        self.items
            .iter()
            .map(|line| format!("{}x {}", line.quantity, line.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `R$ 12,50`
pub fn format_brl(cents: u64) -> String {
    format!("R$ {},{:02}", cents / 100, cents % 100)
}

/// First positive integer in the message, if any. Numbers too large for
/// `u32` come back as `u32::MAX` so the caller can reject them.
fn quantity_in(text: &str) -> Option<u32> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|digits| !digits.is_empty())
        .map(|digits| digits.parse::<u32>().unwrap_or(u32::MAX))
        .filter(|n| *n > 0)
}

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|keyword| text.contains(keyword))
}

const CHECKOUT_KEYWORDS: &[&str] = &["finalizar", "checkout", "fechar pedido"];
const CANCEL_KEYWORDS: &[&str] = &["cancelar", "cancel"];

//
// ================= Flow =================
//

pub type OrderState = ConversationState<OrderStage, OrderData>;

pub struct OrderFlow {
    responder: Arc<Responder>,
    catalog: Catalog,
    prompt: PromptTemplate,
    phrases: TerminationPhrases,
}

impl OrderFlow {
    pub fn new(responder: Arc<Responder>) -> Self {
        Self {
            responder,
            catalog: Catalog::default(),
            prompt: PromptTemplate::new(
                "Você é o garçom de um delivery online, responsável por anotar, registrar, \
                 finalizar e cancelar pedidos.\n\
                 Produtos disponíveis: {cardapio}.\n\
                 Converse de forma objetiva, em português, com o cliente {nome}.\n\
                 Pergunta do cliente: {pergunta}\n\n\
                 Responda de forma curta e útil.",
            ),
            phrases: TerminationPhrases::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn menu_prompt(&self) -> String {
        format!("Temos: {}. O que vai querer?", self.catalog.describe())
    }

    fn cancel(&self, state: &OrderState) -> Turn<OrderStage> {
        info!(conversation_id = %state.conversation_id, "order cancelled");
        Turn::to(
            OrderStage::Cancelled,
            format!("Pedido cancelado. Até logo, {}! 👋", state.display_name()),
        )
    }

    fn add_items(&self, state: &mut OrderState, input: &str) -> Option<Turn<OrderStage>> {
        let mentioned = self.catalog.mentioned_in(input);
        if mentioned.is_empty() {
            return None;
        }

        // A quantity only applies when a single item is named.
        let quantity = match mentioned.len() {
            1 => quantity_in(input).unwrap_or(1),
            _ => 1,
        };

        let fits = mentioned
            .iter()
            .all(|item| state.data.quantity_of(&item.name).saturating_add(quantity) <= MAX_LINE_QUANTITY);
        if !fits {
            return Some(Turn::to(
                state.stage,
                format!(
                    "Aceitamos no máximo {} unidades de cada item. Quantas deseja?",
                    MAX_LINE_QUANTITY
                ),
            ));
        }

        let added: Vec<String> = mentioned
            .iter()
            .filter(|item| state.data.add(item, quantity))
            .map(|item| format!("{}x {}", quantity, item.name))
            .collect();

        Some(Turn::to(
            OrderStage::Cart,
            format!(
                "Adicionado: {}. Total parcial {}. Deseja mais algo ou digite 'finalizar'?",
                added.join(", "),
                format_brl(state.data.total_cents())
            ),
        ))
    }

    fn checkout(&self, state: &OrderState) -> Turn<OrderStage> {
        info!(
            conversation_id = %state.conversation_id,
            total_cents = state.data.total_cents(),
            "order checked out"
        );
        Turn::to(
            OrderStage::CheckedOut,
            format!(
                "Pedido confirmado, {}! Itens: {}. Total {}. Obrigado!",
                state.display_name(),
                state.data.summary(),
                format_brl(state.data.total_cents())
            ),
        )
    }

    async fn answer(&self, state: &mut OrderState, input: &str) -> Turn<OrderStage> {
        let stage = state.stage;
        let name = state.display_name().to_string();
        let catalog = self.catalog.describe();
        let prompt = self.prompt.render(&[
            ("cardapio", catalog.as_str()),
            ("nome", name.as_str()),
            ("pergunta", input),
        ]);

        match self.responder.reply(&prompt).await {
            Ok(answer) => {
                state.push_history(Message::user(input));
                state.push_history(Message::assistant(answer.clone()));
                Turn::to(stage, answer)
            }
            Err(error) => {
                warn!(conversation_id = %state.conversation_id, %error, "generation failed");
                Turn::to(
                    stage,
                    format!(
                        "Desculpe, {}, não consegui responder agora. Tente novamente em instantes.",
                        name
                    ),
                )
            }
        }
    }

    async fn shop(&self, state: &mut OrderState, input: &str) -> Turn<OrderStage> {
        let stage = state.stage;

        if input.is_empty() {
            return match stage {
                OrderStage::Cart => Turn::to(
                    stage,
                    "Deseja adicionar algo mais ou digite 'finalizar' para fechar o pedido?",
                ),
                _ => Turn::to(stage, self.menu_prompt()),
            };
        }

        if mentions_any(input, CANCEL_KEYWORDS) {
            return self.cancel(state);
        }

        if mentions_any(input, CHECKOUT_KEYWORDS) {
            if state.data.is_empty() {
                return Turn::to(
                    OrderStage::Browsing,
                    format!("Seu carrinho está vazio. {}", self.menu_prompt()),
                );
            }
            return self.checkout(state);
        }

        if let Some(turn) = self.add_items(state, input) {
            return turn;
        }

        self.answer(state, input).await
    }
}

#[async_trait::async_trait]
impl Flow for OrderFlow {
    type Stage = OrderStage;
    type Data = OrderData;

    fn termination_phrases(&self) -> &TerminationPhrases {
        &self.phrases
    }

    fn farewell(&self, state: &mut OrderState) -> Turn<OrderStage> {
        self.cancel(state)
    }

    fn closed_reply(&self, state: &OrderState) -> String {
        match state.stage {
            OrderStage::CheckedOut => "Seu pedido já foi finalizado. Obrigado!".to_string(),
            _ => "Conversa encerrada.".to_string(),
        }
    }

    async fn handle(&self, state: &mut OrderState, input: &str) -> Turn<OrderStage> {
        match state.stage {
            OrderStage::Greeting => Turn::to(
                OrderStage::AwaitName,
                "Olá! Eu sou a Ana Bot, sua assistente de pedidos. Como posso te chamar?",
            ),
            OrderStage::AwaitName => {
                if input.is_empty() {
                    return Turn::to(OrderStage::AwaitName, "Não entendi. Qual é o seu nome?");
                }
                let name = extract_name(input);
                if name.is_empty() {
                    return Turn::to(OrderStage::AwaitName, "Poderia repetir seu nome, por favor?");
                }
                let response = format!("Prazer, {}! {}", name, self.menu_prompt());
                state.user_name = Some(name);
                Turn::to(OrderStage::Browsing, response)
            }
            OrderStage::Browsing | OrderStage::Cart => self.shop(state, input).await,
            OrderStage::CheckedOut | OrderStage::Cancelled => {
                Turn::to(state.stage, self.closed_reply(state))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::advance;
    use crate::llm::TextGenerator;
    use crate::test_support::{memoizer, FailingGenerator, ScriptedGenerator};
    use std::time::Duration;

    fn flow(generator: Arc<dyn TextGenerator>) -> OrderFlow {
        let responder = Responder::new(generator, Arc::new(memoizer()), Duration::from_secs(300));
        OrderFlow::new(Arc::new(responder))
    }

    fn at(stage: OrderStage) -> OrderState {
        let mut state = OrderState::new();
        state.set_stage(stage);
        state.user_name = Some("Caio".to_string());
        state
    }

    #[test]
    fn test_format_brl() {
        assert_eq!(format_brl(4500), "R$ 45,00");
        assert_eq!(format_brl(5), "R$ 0,05");
    }

    #[test]
    fn test_quantity_parsing() {
        assert_eq!(quantity_in("quero 12 brigadeiros"), Some(12));
        assert_eq!(quantity_in("quero brigadeiro"), None);
        assert_eq!(quantity_in("0 coxinhas"), None);
        assert_eq!(quantity_in("99999999999 coxinhas"), Some(u32::MAX));
    }

    #[test]
    fn test_cart_rejects_oversized_lines() {
        let catalog = Catalog::bakery();
        let brigadeiro = catalog.mentioned_in("brigadeiro")[0];
        let mut cart = OrderData::default();
        assert!(cart.add(brigadeiro, 90));
        assert!(!cart.add(brigadeiro, u32::MAX));
        assert!(!cart.add(brigadeiro, 10));
        assert!(cart.add(brigadeiro, 9));
        assert_eq!(cart.quantity_of("Brigadeiro"), MAX_LINE_QUANTITY);
        assert_eq!(cart.total_cents(), 99 * 250);
    }

    #[tokio::test]
    async fn test_huge_quantity_reprompts_without_touching_cart() {
        let flow = flow(Arc::new(ScriptedGenerator::new(["x"])));

        let state = advance(&flow, at(OrderStage::Browsing), "4000000000 brigadeiros").await;
        assert_eq!(state.stage, OrderStage::Browsing);
        assert!(state.data.is_empty());
        assert!(state.last_response.contains("no máximo 99"));

        let state = advance(&flow, state, "3 brigadeiros").await;
        let state = advance(&flow, state, "4000000000 brigadeiros").await;
        assert_eq!(state.stage, OrderStage::Cart);
        assert_eq!(state.data.quantity_of("Brigadeiro"), 3);
        assert_eq!(state.data.total_cents(), 750);
    }

    #[test]
    fn test_cart_merges_lines() {
        let catalog = Catalog::bakery();
        let brigadeiro = catalog.mentioned_in("brigadeiro")[0];
        let mut cart = OrderData::default();
        cart.add(brigadeiro, 2);
        cart.add(brigadeiro, 3);
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(cart.total_cents(), 1250);
    }

    #[tokio::test]
    async fn test_checkout_path() {
        let flow = flow(Arc::new(ScriptedGenerator::new(["x"])));

        let state = advance(&flow, OrderState::new(), "").await;
        assert_eq!(state.stage, OrderStage::AwaitName);

        let state = advance(&flow, state, "caio").await;
        assert_eq!(state.stage, OrderStage::Browsing);
        assert!(state.last_response.contains("Brigadeiro"));

        let state = advance(&flow, state, "Quero 4 brigadeiros").await;
        assert_eq!(state.stage, OrderStage::Cart);
        assert_eq!(state.data.total_cents(), 1000);

        let state = advance(&flow, state, "e uma coxinha").await;
        assert_eq!(state.stage, OrderStage::Cart);
        assert_eq!(state.data.items.len(), 2);

        let state = advance(&flow, state, "pode finalizar").await;
        assert_eq!(state.stage, OrderStage::CheckedOut);
        assert!(state.terminated);
        assert!(state.last_response.contains("R$ 16,00"));
    }

    #[tokio::test]
    async fn test_custom_catalog() {
        let catalog = Catalog::new(vec![
            CatalogItem::new("Pizza", 5200),
            CatalogItem::new("Refrigerante", 800),
        ]);
        let flow = flow(Arc::new(ScriptedGenerator::new(["x"]))).with_catalog(catalog);
        assert_eq!(flow.catalog().items().len(), 2);

        let state = advance(&flow, at(OrderStage::Browsing), "").await;
        assert!(state.last_response.contains("Pizza (R$ 52,00)"));
        assert!(!state.last_response.contains("Brigadeiro"));

        let state = advance(&flow, state, "2 pizzas").await;
        let state = advance(&flow, state, "brigadeiro e refrigerante").await;
        assert_eq!(state.data.summary(), "2x Pizza, 1x Refrigerante");
        assert_eq!(state.data.total_cents(), 11_200);
    }

    #[tokio::test]
    async fn test_checkout_with_empty_cart_reprompts() {
        let flow = flow(Arc::new(ScriptedGenerator::new(["x"])));

        let state = advance(&flow, at(OrderStage::Browsing), "finalizar").await;
        assert_eq!(state.stage, OrderStage::Browsing);
        assert!(!state.terminated);
        assert!(state.last_response.starts_with("Seu carrinho está vazio"));
    }

    #[tokio::test]
    async fn test_cancel_from_cart() {
        let flow = flow(Arc::new(ScriptedGenerator::new(["x"])));

        let state = advance(&flow, at(OrderStage::Browsing), "uma torta de limão").await;
        let state = advance(&flow, state, "quero cancelar").await;
        assert_eq!(state.stage, OrderStage::Cancelled);
        assert!(state.terminated);
    }

    #[tokio::test]
    async fn test_farewell_cancels_order() {
        let flow = flow(Arc::new(ScriptedGenerator::new(["x"])));

        let state = advance(&flow, at(OrderStage::Cart), "ok tchau finalizar").await;
        assert_eq!(state.stage, OrderStage::Cancelled);
        assert!(state.terminated);
    }

    #[tokio::test]
    async fn test_free_question_goes_to_responder() {
        let generator = Arc::new(ScriptedGenerator::new(["Entregamos em 40 minutos."]));
        let flow = flow(generator.clone());

        let state = advance(&flow, at(OrderStage::Browsing), "qual o prazo de entrega?").await;
        assert_eq!(state.stage, OrderStage::Browsing);
        assert_eq!(state.last_response, "Entregamos em 40 minutos.");
        assert_eq!(state.history().len(), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_stage() {
        let flow = flow(Arc::new(FailingGenerator));

        let state = advance(&flow, at(OrderStage::Cart), "aceita cartão?").await;
        assert_eq!(state.stage, OrderStage::Cart);
        assert!(state.last_response.starts_with("Desculpe, Caio"));
    }

    #[tokio::test]
    async fn test_every_stage_accepts_any_input() {
        let flow = flow(Arc::new(FailingGenerator));
        let inputs = ["", "tchau", "finalizar", "cancelar", "2 coxinhas", "?"];

        for stage in OrderStage::ALL {
            for input in inputs {
                let state = advance(&flow, at(*stage), input).await;
                assert!(OrderStage::ALL.contains(&state.stage));
                assert_eq!(state.terminated, state.stage.is_terminal());
            }
        }
    }

    #[tokio::test]
    async fn test_cart_survives_blob_round_trip() {
        let flow = flow(Arc::new(ScriptedGenerator::new(["x"])));

        let state = advance(&flow, at(OrderStage::Browsing), "2 pão de queijo").await;
        let restored = OrderState::from_blob(&state.to_blob().unwrap()).unwrap();
        assert_eq!(restored.stage, OrderStage::Cart);
        assert_eq!(restored.data, state.data);

        let done = advance(&flow, restored, "checkout").await;
        assert_eq!(done.stage, OrderStage::CheckedOut);
    }
}

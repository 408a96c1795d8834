//! Question-answering assistant flow
//!
//! Greets, learns the user's name, then answers free-form questions through
//! the memoized responder until a farewell arrives.

use super::{extract_name, Flow, TerminationPhrases, Turn};
use crate::llm::{PromptTemplate, Responder};
use crate::models::{ConversationState, Message, Stage};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssistantStage {
    Greeting,
    AwaitName,
    MainLoop,
    Terminal,
}

impl Stage for AssistantStage {
    const ALL: &'static [Self] = &[
        AssistantStage::Greeting,
        AssistantStage::AwaitName,
        AssistantStage::MainLoop,
        AssistantStage::Terminal,
    ];

    fn initial() -> Self {
        AssistantStage::Greeting
    }

    fn tag(&self) -> &'static str {
        match self {
            AssistantStage::Greeting => "boas_vindas",
            AssistantStage::AwaitName => "aguardar_nome",
            AssistantStage::MainLoop => "responder_perguntas",
            AssistantStage::Terminal => "fim",
        }
    }

    fn is_terminal(&self) -> bool {
        *self == AssistantStage::Terminal
    }

    fn is_open(&self) -> bool {
        *self == AssistantStage::MainLoop
    }
}

pub type AssistantState = ConversationState<AssistantStage>;

/// Who the assistant is and how it phrases its prompt
#[derive(Debug, Clone)]
pub struct Persona {
    pub greeting: String,
    pub prompt: PromptTemplate,
    /// Used when the user sends an empty message in the main loop
    pub default_question: String,
}

impl Persona {
    pub fn tech_advisor() -> Self {
        Self {
            greeting: "Olá! Eu sou o TechAdvisor. Como posso te chamar?".to_string(),
            prompt: PromptTemplate::new(
                "Você é o TechAdvisor, um especialista amigável em tecnologia e programação.\n\
                 Converse de forma objetiva, em português, com o usuário {nome}.\n\
                 Pergunta do usuário: {pergunta}\n\n\
                 Responda de forma curta e útil. Quando adequado, recomende tecnologias, \
                 frameworks, boas práticas ou próximos passos de estudo.",
            ),
            default_question: "Me diga algo legal sobre tecnologia.".to_string(),
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::tech_advisor()
    }
}

pub struct AssistantFlow {
    responder: Arc<Responder>,
    persona: Persona,
    phrases: TerminationPhrases,
}

impl AssistantFlow {
    pub fn new(responder: Arc<Responder>) -> Self {
        Self {
            responder,
            persona: Persona::default(),
            phrases: TerminationPhrases::default(),
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_phrases(mut self, phrases: TerminationPhrases) -> Self {
        self.phrases = phrases;
        self
    }

    async fn answer(&self, state: &mut AssistantState, input: &str) -> Turn<AssistantStage> {
        let name = state.display_name().to_string();
        let question = if input.is_empty() {
            self.persona.default_question.as_str()
        } else {
            input
        };
        let prompt = self
            .persona
            .prompt
            .render(&[("nome", name.as_str()), ("pergunta", question)]);

        match self.responder.reply(&prompt).await {
            Ok(answer) => {
                if !input.is_empty() {
                    state.push_history(Message::user(input));
                }
                state.push_history(Message::assistant(answer.clone()));
                Turn::to(AssistantStage::MainLoop, answer)
            }
            Err(error) => {
                warn!(conversation_id = %state.conversation_id, %error, "generation failed");
                Turn::to(
                    AssistantStage::MainLoop,
                    format!(
                        "Desculpe, {}, não consegui gerar uma resposta agora. Tente novamente em instantes.",
                        name
                    ),
                )
            }
        }
    }
}

#[async_trait::async_trait]
impl Flow for AssistantFlow {
    type Stage = AssistantStage;
    type Data = ();

    fn termination_phrases(&self) -> &TerminationPhrases {
        &self.phrases
    }

    fn farewell(&self, state: &mut AssistantState) -> Turn<AssistantStage> {
        Turn::to(
            AssistantStage::Terminal,
            format!("Até logo, {}! 👋", state.display_name()),
        )
    }

    fn closed_reply(&self, _state: &AssistantState) -> String {
        "Conversa encerrada.".to_string()
    }

    async fn handle(&self, state: &mut AssistantState, input: &str) -> Turn<AssistantStage> {
        match state.stage {
            AssistantStage::Greeting => {
                Turn::to(AssistantStage::AwaitName, self.persona.greeting.clone())
            }
            AssistantStage::AwaitName => {
                if input.is_empty() {
                    return Turn::to(AssistantStage::AwaitName, "Não entendi. Qual é o seu nome?");
                }
                let name = extract_name(input);
                if name.is_empty() {
                    return Turn::to(
                        AssistantStage::AwaitName,
                        "Poderia repetir seu nome, por favor?",
                    );
                }
                let response = format!("Prazer, {}! Como posso ajudar em tecnologia hoje?", name);
                state.user_name = Some(name);
                Turn::to(AssistantStage::MainLoop, response)
            }
            AssistantStage::MainLoop => self.answer(state, input).await,
            AssistantStage::Terminal => Turn::to(AssistantStage::Terminal, self.closed_reply(state)),
        }
    }
}

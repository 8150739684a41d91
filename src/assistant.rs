//! Rule-based chat assistant.
//!
//! A query is first reduced to the criteria it mentions (property type,
//! neighborhood, price ceiling) and the active listings matching them. The
//! [`RULES`] table is then walked in order and the first rule whose trigger
//! fires produces the answer. Listing matches come first, canned answers next,
//! and the catch-all fallback last.

use crate::models::Listing;
use crate::normalize::format_brl;
use regex::Regex;
use std::sync::LazyLock;

const MAX_MATCHES: usize = 5;

pub const GREETING: &str =
    "Olá! 👋 Posso te ajudar a encontrar casas e apartamentos. Diga um bairro ou valor.";
pub const NO_MATCH: &str = "Não encontrei imóveis ativos com esses critérios no momento. \
     Quer tentar outro bairro, outro tipo de imóvel ou uma faixa de valor maior?";
pub const FALLBACK: &str = "Posso te ajudar com imóveis, serviços, valores e bairros 🏘️. \
     Diga, por exemplo: 'casas em Ratones' ou 'apartamentos até 600 mil em Canasvieiras'.";
pub const ADDRESS: &str = "📍 Rua Intendente Antônio Damasco, 2330 - Ratones / Florianópolis.";
pub const BUSINESS_HOURS: &str =
    "Nosso atendimento é de segunda a sexta, das 9h às 18h 🕒, e aos sábados sob agendamento.";

/// A recognizable word in a query and the fragment it looks for in listing data.
#[derive(Debug)]
pub struct Keyword {
    pub term: &'static str,
    pub fragment: &'static str,
    pub label: &'static str,
}

const fn kw(term: &'static str, fragment: &'static str, label: &'static str) -> Keyword {
    Keyword {
        term,
        fragment,
        label,
    }
}

/// Checked in order; the first term found in the query wins.
pub static PROPERTY_TYPES: &[Keyword] = &[
    kw("apartamento", "apart", "apartamento"),
    kw("apto", "apart", "apartamento"),
    kw("cobertura", "cobertura", "cobertura"),
    kw("kitnet", "kitnet", "kitnet"),
    kw("studio", "studio", "studio"),
    kw("sobrado", "sobrado", "sobrado"),
    kw("casa", "casa", "casa"),
    kw("terreno", "terreno", "terreno"),
    kw("sala comercial", "sala", "sala comercial"),
    kw("galpão", "galp", "galpão"),
];

/// Checked in order; longer names precede the shorter names they contain.
pub static NEIGHBORHOODS: &[Keyword] = &[
    kw("ratones", "ratones", "Ratones"),
    kw("ponta das canas", "ponta das canas", "Ponta das Canas"),
    kw("canasvieiras", "canas", "Canasvieiras"),
    kw("canas", "canas", "Canasvieiras"),
    kw("jurerê", "jur", "Jurerê"),
    kw("jurere", "jur", "Jurerê"),
    kw("daniela", "daniela", "Daniela"),
    kw("ingleses", "ingleses", "Ingleses"),
    kw("santinho", "santinho", "Santinho"),
    kw("cacupé", "cacup", "Cacupé"),
    kw("cacupe", "cacup", "Cacupé"),
    kw("santo antônio", "santo ant", "Santo Antônio de Lisboa"),
    kw("santo antonio", "santo ant", "Santo Antônio de Lisboa"),
    kw("sambaqui", "sambaqui", "Sambaqui"),
    kw("vargem", "vargem", "Vargem"),
    kw("campeche", "campeche", "Campeche"),
    kw("lagoa", "lagoa", "Lagoa da Conceição"),
    kw("centro", "centro", "Centro"),
];

static CEILING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:[.,]\d+)?)\s*(mil|milhão|milhões|milhao|milhoes|m)\b")
        .expect("price ceiling pattern is valid")
});

/// Criteria found in one query, with the listings that satisfy them.
#[derive(Debug)]
pub struct Query<'a> {
    pub text: String,
    pub kind: Option<&'static Keyword>,
    pub neighborhood: Option<&'static Keyword>,
    pub ceiling: Option<f64>,
    pub matches: Vec<&'a Listing>,
}

impl<'a> Query<'a> {
    pub fn analyze(raw: &str, listings: &'a [Listing]) -> Self {
        let text = raw.trim().to_lowercase();
        let kind = first_keyword(&text, PROPERTY_TYPES);
        let neighborhood = first_keyword(&text, NEIGHBORHOODS);
        let ceiling = extract_ceiling(&text);

        let mut query = Query {
            text,
            kind,
            neighborhood,
            ceiling,
            matches: Vec::new(),
        };
        if query.has_criteria() {
            let matches = listings
                .iter()
                .filter(|listing| listing.is_active() && query.accepts(listing))
                .take(MAX_MATCHES)
                .collect();
            query.matches = matches;
        }
        query
    }

    pub fn has_criteria(&self) -> bool {
        self.kind.is_some() || self.neighborhood.is_some() || self.ceiling.is_some()
    }

    fn accepts(&self, listing: &Listing) -> bool {
        if let Some(kind) = self.kind {
            if !listing.kind.to_lowercase().contains(kind.fragment) {
                return false;
            }
        }
        if let Some(hood) = self.neighborhood {
            let in_hood = listing
                .neighborhood
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(hood.fragment));
            if !in_hood {
                return false;
            }
        }
        match self.ceiling {
            Some(ceiling) => listing.price <= ceiling,
            None => true,
        }
    }

    fn mentions(&self, terms: &[&str]) -> bool {
        terms.iter().any(|term| self.text.contains(term))
    }
}

fn first_keyword(text: &str, keywords: &'static [Keyword]) -> Option<&'static Keyword> {
    keywords.iter().find(|keyword| text.contains(keyword.term))
}

/// "até 600 mil" → 600000, "1,5 milhão" → 1500000.
pub fn extract_ceiling(text: &str) -> Option<f64> {
    let captures = CEILING.captures(text)?;
    let number: f64 = captures.get(1)?.as_str().replace(',', ".").parse().ok()?;
    let multiplier = match captures.get(2)?.as_str() {
        "mil" => 1_000.0,
        _ => 1_000_000.0,
    };
    Some(number * multiplier)
}

enum Trigger {
    Keywords(&'static [&'static str]),
    When(fn(&Query<'_>) -> bool),
}

enum Answer {
    Fixed(&'static str),
    Build(fn(&Query<'_>) -> String),
}

/// One step of the responder: when `trigger` fires, `answer` is the reply.
pub struct Rule {
    pub name: &'static str,
    trigger: Trigger,
    answer: Answer,
}

impl Rule {
    const fn canned(
        name: &'static str,
        terms: &'static [&'static str],
        answer: &'static str,
    ) -> Self {
        Rule {
            name,
            trigger: Trigger::Keywords(terms),
            answer: Answer::Fixed(answer),
        }
    }

    fn fires(&self, query: &Query<'_>) -> bool {
        match &self.trigger {
            Trigger::Keywords(terms) => query.mentions(terms),
            Trigger::When(predicate) => predicate(query),
        }
    }

    fn reply(&self, query: &Query<'_>) -> String {
        match &self.answer {
            Answer::Fixed(text) => text.to_string(),
            Answer::Build(build) => build(query),
        }
    }
}

pub static RULES: &[Rule] = &[
    Rule {
        name: "listing_matches",
        trigger: Trigger::When(has_matches),
        answer: Answer::Build(describe_matches),
    },
    Rule::canned(
        "buy",
        &["comprar", "compra", "venda"],
        "Comprar um imóvel é um ótimo investimento 🏡. Posso te mostrar as opções disponíveis hoje?",
    ),
    Rule::canned(
        "financing",
        &["financiamento", "financiar", "banco", "entrada"],
        "A Brando te orienta em todo o processo de financiamento 🏦. Trabalhamos com os principais bancos!",
    ),
    Rule::canned(
        "documents",
        &["documento", "documentação", "documentacao", "escritura"],
        "Fique tranquilo! A Brando te acompanha em todas as etapas de documentação do imóvel 📑.",
    ),
    Rule::canned(
        "visit",
        &["visita", "agendar", "ver imóvel", "ver imovel"],
        "Quer agendar uma visita? 😊 É só me dizer o código do imóvel ou o bairro que te interessa.",
    ),
    Rule::canned(
        "rent",
        &["alugar", "aluguel", "locação", "locacao"],
        "Também trabalhamos com locações 🏘️. Quer ver imóveis para alugar em algum bairro específico?",
    ),
    Rule::canned(
        "contract",
        &["contrato"],
        "Os contratos seguem padrões atualizados, com transparência e segurança para ambas as partes 🤝.",
    ),
    Rule::canned(
        "service_request",
        &["serviço", "servico", "reparo", "manutenção", "manutencao", "chamado"],
        "Se você já comprou conosco, pode abrir um chamado de serviço em /servicos 🛠️.",
    ),
    Rule::canned(
        "renovation",
        &["reforma", "pintura", "hidráulica", "hidraulica", "elétrica", "eletrica"],
        "A Brando conta com parceiros para reformas e manutenções. Podemos te indicar alguém 👍.",
    ),
    Rule::canned(
        "neighborhoods",
        &["bairro", "região", "regiao"],
        "Temos imóveis em Ratones, Canasvieiras, Jurerê e outras regiões de Florianópolis 🗺️.",
    ),
    Rule::canned(
        "price_hint",
        &["preço", "preco", "valor", "quanto custa", "faixa"],
        "Posso te ajudar a buscar imóveis por faixa de valor 💰. Exemplo: 'até 600 mil em Canasvieiras'.",
    ),
    Rule::canned(
        "investment",
        &["caro", "barato", "investimento", "investir"],
        "Temos imóveis para todos os perfis, de oportunidades acessíveis a investimentos premium 💼.",
    ),
    Rule::canned(
        "business_hours",
        &["horário", "horario", "funciona", "aberto", "atendimento"],
        BUSINESS_HOURS,
    ),
    Rule::canned(
        "address",
        &["endereço", "endereco", "localização", "localizacao", "onde fica"],
        ADDRESS,
    ),
    Rule::canned(
        "contact",
        &["telefone", "contato", "whats"],
        "Você pode falar com a gente pelo WhatsApp 📱 (48) 99105-4216.",
    ),
    Rule::canned(
        "creci",
        &["creci"],
        "A Brando Imóveis atua regularmente com o CRECI 61150 🏠.",
    ),
    Rule::canned(
        "about",
        &["quem é", "quem e ", "sobre", "história", "historia"],
        "A Brando Imóveis nasceu com propósito 💙: unir tecnologia e confiança para facilitar a compra do seu imóvel.",
    ),
    Rule::canned(
        "technology",
        &["nous", "tecnologia"],
        "O site da Brando foi desenvolvido pela Nous Tecnologia ⚙️, trazendo inovação para o mercado imobiliário.",
    ),
    Rule {
        name: "no_match",
        trigger: Trigger::When(has_criteria),
        answer: Answer::Fixed(NO_MATCH),
    },
    Rule {
        name: "fallback",
        trigger: Trigger::When(always),
        answer: Answer::Fixed(FALLBACK),
    },
];

fn has_matches(query: &Query<'_>) -> bool {
    !query.matches.is_empty()
}

fn has_criteria(query: &Query<'_>) -> bool {
    query.has_criteria()
}

fn always(_: &Query<'_>) -> bool {
    true
}

fn describe_matches(query: &Query<'_>) -> String {
    let n = query.matches.len();
    let list = query
        .matches
        .iter()
        .map(|listing| {
            format!(
                "{} em {} (R$ {})",
                listing.kind,
                listing
                    .neighborhood
                    .as_deref()
                    .unwrap_or("bairro não informado"),
                format_brl(listing.price)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    let options = if n == 1 { "opção" } else { "opções" };

    match (query.kind, query.neighborhood) {
        (Some(kind), Some(hood)) => format!(
            "Encontrei {} {} de {} em {}: {}.",
            n, options, kind.label, hood.label, list
        ),
        (Some(kind), None) => format!("Encontrei {} {} de {}: {}.", n, options, kind.label, list),
        (None, Some(hood)) => format!("Temos {} {} em {}: {}.", n, options, hood.label, list),
        (None, None) => format!(
            "Encontrei {} {} dentro desse valor: {}.",
            n,
            if n == 1 { "imóvel" } else { "imóveis" },
            list
        ),
    }
}

/// Name of the rule that answers `query`, with its reply.
pub fn evaluate(query: &str, listings: &[Listing]) -> (&'static str, String) {
    let analyzed = Query::analyze(query, listings);
    if analyzed.text.is_empty() {
        return ("greeting", GREETING.to_string());
    }

    RULES
        .iter()
        .find(|rule| rule.fires(&analyzed))
        .map(|rule| (rule.name, rule.reply(&analyzed)))
        .unwrap_or(("fallback", FALLBACK.to_string()))
}

/// Answer a free-text question using the active listings.
pub fn respond(query: &str, listings: &[Listing]) -> String {
    evaluate(query, listings).1
}

/// Rule names in evaluation order.
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|rule| rule.name).collect()
}

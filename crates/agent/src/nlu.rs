//! Deterministic French-language intent resolution.
//!
//! One raw WhatsApp message becomes a [`MessageInput`] for the dialogue
//! engine: an optional action intent, slot values addressed to the step the
//! conversation is waiting on, a yes/no reading, a correction target or an
//! abort marker. The resolver is keyword-driven and deliberately
//! conservative: anything it cannot read with confidence is left out and the
//! engine asks again. A hosted model can replace it behind [`IntentResolver`]
//! without touching the engine.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use rust_decimal::Decimal;

use artibot_core::dialogue::{
    ActionType, ConversationState, MessageInput, PrestationSlot, SlotKey, SlotValue, Step,
};

/// Boundary behind which message understanding lives.
///
/// Implementations translate text into structured input. They never execute
/// actions and never decide business outcomes; the engine and the
/// orchestrator own both.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve(
        &self,
        text: &str,
        state: &ConversationState,
        now: DateTime<Utc>,
    ) -> Result<MessageInput>;
}

/// Keyword resolver used by the tests, the CLI and any deployment that has
/// no hosted model configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicIntentResolver;

#[async_trait]
impl IntentResolver for DeterministicIntentResolver {
    async fn resolve(
        &self,
        text: &str,
        state: &ConversationState,
        now: DateTime<Utc>,
    ) -> Result<MessageInput> {
        Ok(self.parse(text, state, now))
    }
}

impl DeterministicIntentResolver {
    pub fn parse(&self, text: &str, state: &ConversationState, now: DateTime<Utc>) -> MessageInput {
        let text = text.trim();
        let normalized = normalize_text(text);
        let tokens = tokenize(&normalized);

        if detect_abort(&normalized) {
            return MessageInput { abort: true, ..MessageInput::default() };
        }

        let mut input = MessageInput {
            intent: detect_intent(&normalized),
            affirmation: detect_affirmation(&normalized, &tokens),
            document_ref: extract_document_ref(&normalized),
            ..MessageInput::default()
        };

        match state.current_step {
            Some(Step::Confirmation) => {
                if let Some(key) = correction_target(&normalized, state.action_type) {
                    input.correction = Some(key);
                }
            }
            Some(Step::AskClient) => {
                if let Some(name) = client_answer(text) {
                    input.slots.push((SlotKey::Client, SlotValue::Text(name)));
                }
            }
            Some(Step::AskPrestations) => {
                let lignes = parse_prestations(text);
                if !lignes.is_empty() {
                    input.slots.push((SlotKey::Prestations, SlotValue::Prestations(lignes)));
                }
            }
            Some(Step::AskDelay) => push_text(&mut input.slots, SlotKey::Delai, text),
            Some(Step::AskAddress) => push_text(&mut input.slots, SlotKey::Adresse, text),
            Some(Step::AskDossierInfo) => push_text(&mut input.slots, SlotKey::DossierInfo, text),
            Some(Step::AskFicheVisite) => {
                push_text(&mut input.slots, SlotKey::FicheObservations, text)
            }
            Some(Step::AskRdvDate) | Some(Step::AskRdvConfirm) => {
                if let Some(date_heure) = parse_date_time(&normalized, now) {
                    input.slots.push((SlotKey::RdvDate, SlotValue::Date(date_heure)));
                }
            }
            Some(Step::PostVisite) | Some(Step::ReadyToCreate) => {}
            None => {
                if let Some(intent) = input.intent {
                    opportunistic_slots(text, &normalized, intent, now, &mut input.slots);
                }
            }
        }

        input
    }
}

fn push_text(slots: &mut Vec<(SlotKey, SlotValue)>, key: SlotKey, text: &str) {
    if !text.is_empty() {
        slots.push((key, SlotValue::Text(text.to_string())));
    }
}

/// Slot values guessed from a first message, before any step was asked.
fn opportunistic_slots(
    text: &str,
    normalized: &str,
    intent: ActionType,
    now: DateTime<Utc>,
    slots: &mut Vec<(SlotKey, SlotValue)>,
) {
    let client = match intent {
        ActionType::SearchClient => name_after_markers(text, SEARCH_MARKERS)
            .or_else(|| name_after_markers(text, CLIENT_MARKERS)),
        _ => name_after_markers(text, CLIENT_MARKERS),
    };
    if let Some(name) = client {
        slots.push((SlotKey::Client, SlotValue::Text(name)));
    }

    match intent {
        ActionType::PlanifierRdv => {
            if let Some(date_heure) = parse_date_time(normalized, now) {
                slots.push((SlotKey::RdvDate, SlotValue::Date(date_heure)));
            }
        }
        ActionType::CreateDevis => {
            // "devis pour Dupont : 2 fenetres a 450 euros, ..."
            if let Some((_, after)) = text.split_once(':') {
                let lignes = parse_prestations(after);
                if !lignes.is_empty() {
                    slots.push((SlotKey::Prestations, SlotValue::Prestations(lignes)));
                }
            }
        }
        _ => {}
    }
}

/// Lowercases and folds the accents artisans type (or skip) interchangeably.
fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for character in text.chars().flat_map(char::to_lowercase) {
        match character {
            'à' | 'â' | 'ä' => normalized.push('a'),
            'é' | 'è' | 'ê' | 'ë' => normalized.push('e'),
            'î' | 'ï' => normalized.push('i'),
            'ô' | 'ö' => normalized.push('o'),
            'ù' | 'û' | 'ü' => normalized.push('u'),
            'ç' => normalized.push('c'),
            'œ' => normalized.push_str("oe"),
            other => normalized.push(other),
        }
    }
    normalized
}

fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

const SEARCH_VERBS: &[&str] = &["cherche", "recherche", "retrouve", "trouve"];

fn detect_intent(normalized: &str) -> Option<ActionType> {
    // "cherche le devis de Dupont" is a lookup, not a creation; a search verb
    // opening the message (or right after a pronoun, "je cherche") outranks
    // every later keyword. "devis recherche de fuite" stays a creation.
    let mut opening = normalized
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()));
    let first = opening.next().unwrap_or("");
    let second = opening.next().unwrap_or("");
    let leading_search = SEARCH_VERBS.contains(&first)
        || (matches!(first, "je" | "tu" | "on") && SEARCH_VERBS.contains(&second));

    if contains_any(normalized, &["relance", "impaye"]) {
        return Some(ActionType::Relance);
    }
    if leading_search {
        return Some(ActionType::SearchClient);
    }
    if normalized.contains("facture") {
        return Some(ActionType::CreateFacture);
    }
    if contains_any(normalized, &["fiche de visite", "fiche visite", "compte rendu", "compte-rendu"])
    {
        return Some(ActionType::CreerFicheVisite);
    }
    if contains_any(normalized, &["rendez-vous", "rendez vous", "rdv"]) {
        return Some(ActionType::PlanifierRdv);
    }
    if contains_any(normalized, &["devis", "estimation", "chiffrage"]) {
        return Some(ActionType::CreateDevis);
    }
    if contains_any(normalized, &["dossier", "nouveau client", "prospect"]) {
        return Some(ActionType::CreateDossier);
    }
    if contains_any(normalized, SEARCH_VERBS) || contains_any(normalized, &["coordonnees", "qui est"])
    {
        return Some(ActionType::SearchClient);
    }
    None
}

fn detect_abort(normalized: &str) -> bool {
    contains_any(normalized, &["annule", "annuler", "stop", "laisse tomber", "abandonne"])
}

const AFFIRMATIVE_TOKENS: &[&str] =
    &["oui", "ouais", "ok", "oki", "yes", "parfait", "confirme", "valide", "go", "nickel", "impec"];
const AFFIRMATIVE_PHRASES: &[&str] = &[
    "c'est bon",
    "cest bon",
    "d'accord",
    "daccord",
    "ca marche",
    "vas-y",
    "vas y",
    "tres bien",
    "on y va",
];
const NEGATIVE_TOKENS: &[&str] = &["non", "no", "nope"];
const NEGATIVE_PHRASES: &[&str] =
    &["pas encore", "pas bon", "pas correct", "pas ca", "pas maintenant", "surtout pas"];

fn detect_affirmation(normalized: &str, tokens: &[String]) -> Option<bool> {
    let affirmative = tokens.iter().any(|token| AFFIRMATIVE_TOKENS.contains(&token.as_str()))
        || contains_any(normalized, AFFIRMATIVE_PHRASES);
    let negative = tokens.iter().any(|token| NEGATIVE_TOKENS.contains(&token.as_str()))
        || contains_any(normalized, NEGATIVE_PHRASES);
    match (affirmative, negative) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

fn correction_target(normalized: &str, action: Option<ActionType>) -> Option<SlotKey> {
    if !contains_any(normalized, &["change", "modifie", "corrige", "remplace", "plutot"]) {
        return None;
    }
    if contains_any(normalized, &["client", "nom"]) {
        return Some(SlotKey::Client);
    }
    if contains_any(normalized, &["prestation", "ligne", "article"]) {
        return Some(SlotKey::Prestations);
    }
    if normalized.contains("delai") {
        return Some(SlotKey::Delai);
    }
    if normalized.contains("adresse") {
        return Some(SlotKey::Adresse);
    }
    if contains_any(normalized, &["date", "heure", "jour", "creneau"]) {
        return Some(SlotKey::RdvDate);
    }
    if normalized.contains("observation") {
        return Some(SlotKey::FicheObservations);
    }
    if contains_any(normalized, &["info", "description", "travaux"]) {
        return match action {
            Some(ActionType::CreateDevis) => Some(SlotKey::Prestations),
            _ => Some(SlotKey::DossierInfo),
        };
    }
    None
}

/// Document numeros ("DEV-2025-0012", "FAC-2025-0003") mentioned anywhere in
/// the message, restored to the uppercase form they are stored under.
fn extract_document_ref(normalized: &str) -> Option<String> {
    for word in normalized.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
        let Some(rest) =
            trimmed.strip_prefix("dev-").or_else(|| trimmed.strip_prefix("fac-"))
        else {
            continue;
        };
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '-') {
            return Some(trimmed.to_uppercase());
        }
    }
    None
}

const LEADING_SKIP: &[&str] = &[
    "le", "la", "les", "un", "une", "des", "du", "de", "mes", "mon", "ma", "client", "cliente",
    "coordonnees", "numero", "telephone", "est", "monsieur", "madame", "mr", "mme", "m",
];
const HARD_STOPS: &[&str] = &[
    "a",
    "au",
    "aux",
    "et",
    "en",
    "sur",
    "dans",
    "pour",
    "avec",
    "chez",
    "demain",
    "apres-demain",
    "aujourd'hui",
    "matin",
    "midi",
    "soir",
    "lundi",
    "mardi",
    "mercredi",
    "jeudi",
    "vendredi",
    "samedi",
    "dimanche",
    "devis",
    "facture",
    "rdv",
    "rendez-vous",
    "dossier",
    "fiche",
    "visite",
    "relance",
    "chantier",
    "son",
    "sa",
    "ce",
    "cette",
];

const CLIENT_MARKERS: &[&str] = &["pour", "chez", "avec"];
const SEARCH_MARKERS: &[&str] =
    &["cherche", "recherche", "retrouve", "trouve", "client", "cliente", "coordonnees", "qui"];

/// Up to three name words following a marker, with articles and politeness
/// titles skipped. Digits, dates and action keywords end the name.
fn name_after_markers(text: &str, markers: &[&str]) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    for (index, word) in words.iter().enumerate() {
        let marker = normalize_text(word);
        let marker = marker.trim_matches(|c: char| !c.is_alphanumeric());
        if !markers.contains(&marker) {
            continue;
        }
        let mut collected: Vec<&str> = Vec::new();
        for candidate in &words[index + 1..] {
            let normalized = normalize_text(candidate);
            let stripped =
                normalized.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '\'');
            if stripped.is_empty() {
                break;
            }
            if collected.is_empty() && LEADING_SKIP.contains(&stripped) {
                continue;
            }
            if HARD_STOPS.contains(&stripped)
                || stripped.chars().next().is_some_and(|c| c.is_ascii_digit())
            {
                break;
            }
            let cleaned = candidate
                .trim_matches(|c: char| matches!(c, ',' | '.' | ':' | ';' | '!' | '?'));
            if cleaned.is_empty() {
                break;
            }
            collected.push(cleaned);
            if cleaned.len() != candidate.len() || collected.len() == 3 {
                break;
            }
        }
        if !collected.is_empty() {
            return Some(collected.join(" "));
        }
    }
    None
}

/// Direct answer to "C'est pour quel client ?": the text minus leading
/// fillers and politeness titles.
fn client_answer(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut start = 0;
    while start < words.len() {
        let normalized = normalize_text(words[start]);
        let stripped = normalized.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
        if stripped == "c'est" || stripped == "cest" || stripped == "pour" || stripped == "chez"
            || LEADING_SKIP.contains(&stripped)
        {
            start += 1;
        } else {
            break;
        }
    }
    if start == words.len() {
        return None;
    }
    let name = words[start..].join(" ");
    let name = name.trim_matches(|c: char| matches!(c, ',' | '.' | '!' | '?' | ' '));
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn parse_date_time(normalized: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let date = parse_date_part(normalized, now.date_naive())?;
    let time = parse_time_part(normalized)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("lundi", Weekday::Mon),
    ("mardi", Weekday::Tue),
    ("mercredi", Weekday::Wed),
    ("jeudi", Weekday::Thu),
    ("vendredi", Weekday::Fri),
    ("samedi", Weekday::Sat),
    ("dimanche", Weekday::Sun),
];

fn parse_date_part(normalized: &str, today: NaiveDate) -> Option<NaiveDate> {
    for word in normalized.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_ascii_digit() && c != '/');
        if trimmed.contains('/') {
            if let Some(date) = parse_numeric_date(trimmed, today) {
                return Some(date);
            }
        }
    }
    if normalized.contains("apres-demain") || normalized.contains("apres demain") {
        return Some(today + Duration::days(2));
    }
    if normalized.contains("demain") {
        return Some(today + Duration::days(1));
    }
    if normalized.contains("aujourd") {
        return Some(today);
    }
    for (name, weekday) in WEEKDAYS {
        if normalized.contains(name) {
            let today_number = i64::from(today.weekday().num_days_from_monday());
            let target_number = i64::from(weekday.num_days_from_monday());
            let mut ahead = (target_number - today_number).rem_euclid(7);
            // A bare weekday always means the next one, never today.
            if ahead == 0 {
                ahead = 7;
            }
            return Some(today + Duration::days(ahead));
        }
    }
    None
}

fn parse_numeric_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = token.split('/').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let day: u32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let explicit_year = parts.get(2).map(|raw| raw.parse::<i32>()).transpose().ok()?;
    let year = match explicit_year {
        Some(value) if value < 100 => 2000 + value,
        Some(value) => value,
        None => today.year(),
    };
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    if explicit_year.is_none() && date < today {
        return NaiveDate::from_ymd_opt(year + 1, month, day);
    }
    Some(date)
}

fn parse_time_part(normalized: &str) -> Option<NaiveTime> {
    for word in normalized.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_ascii_digit() && c != 'h' && c != ':');
        if let Some(time) = parse_time_token(trimmed) {
            return Some(time);
        }
    }
    None
}

fn parse_time_token(token: &str) -> Option<NaiveTime> {
    let (raw_hour, raw_minute) = token.split_once('h').or_else(|| token.split_once(':'))?;
    if raw_hour.is_empty() || !raw_hour.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = raw_hour.parse().ok()?;
    let minute: u32 = if raw_minute.is_empty() { 0 } else { raw_minute.parse().ok()? };
    if minute >= 60 {
        return None;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Splits "2 fenetres a 450 euros, 1 porte a 900 euros" into priced lines.
/// Commas directly inside numbers ("450,50") survive because only a comma
/// followed by a space separates lines.
fn parse_prestations(text: &str) -> Vec<PrestationSlot> {
    let canonical = text.replace(';', "\n").replace(", ", "\n");
    canonical.split('\n').filter_map(parse_prestation_segment).collect()
}

fn parse_prestation_segment(segment: &str) -> Option<PrestationSlot> {
    let words: Vec<&str> = segment.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let mut quantite = None;
    let mut prix_unitaire_ht = None;
    let mut tva_pct = None;
    let mut description_words: Vec<&str> = Vec::new();
    let mut index = 0;

    while index < words.len() {
        let word = words[index];
        let normalized = normalize_text(word);

        if index == 0 && words.len() > 1 {
            if let Some(value) = number_in(&normalized) {
                quantite = Some(value);
                index += 1;
                continue;
            }
        }
        if normalized == "tva" {
            let mut next = index + 1;
            if words
                .get(next)
                .map(|w| normalize_text(w))
                .is_some_and(|n| n == "a" || n == "de")
            {
                next += 1;
            }
            if let Some(value) = words.get(next).and_then(|w| number_in(&normalize_text(w))) {
                tva_pct = Some(value);
                index = next + 1;
                continue;
            }
        }
        if normalized == "a" || normalized == "pour" {
            if let Some(value) = words.get(index + 1).and_then(|w| number_in(&normalize_text(w))) {
                prix_unitaire_ht = Some(value);
                index += 2;
                if words.get(index).map(|w| is_currency(w)).unwrap_or(false) {
                    index += 1;
                }
                continue;
            }
        }
        if is_currency(word) {
            index += 1;
            continue;
        }
        if let Some(value) = number_in(&normalized) {
            let next_is_currency = words.get(index + 1).map(|w| is_currency(w)).unwrap_or(false);
            if word.contains('€') || next_is_currency {
                prix_unitaire_ht = Some(value);
                index += if next_is_currency { 2 } else { 1 };
                continue;
            }
            if index + 1 == words.len() && prix_unitaire_ht.is_none() {
                prix_unitaire_ht = Some(value);
                index += 1;
                continue;
            }
        }
        description_words.push(word);
        index += 1;
    }

    let description = description_words.join(" ");
    let description = description.trim_matches(|c: char| matches!(c, '.' | ':' | '-' | ' '));
    if description.is_empty() {
        return None;
    }
    Some(PrestationSlot {
        description: description.to_string(),
        quantite,
        prix_unitaire_ht,
        tva_pct,
    })
}

fn is_currency(word: &str) -> bool {
    if word.contains('€') {
        return true;
    }
    let normalized = normalize_text(word);
    let stripped = normalized.trim_matches(|c: char| !c.is_alphanumeric());
    matches!(stripped, "euro" | "euros" | "eur")
}

/// Reads "450", "450,50", "450€" or "10%" as a decimal; anything containing
/// other separators (dates, dimensions) is rejected.
fn number_in(word: &str) -> Option<Decimal> {
    let trimmed = word.trim_matches(|c: char| !c.is_ascii_digit() && c != ',' && c != '.');
    if trimmed.is_empty() || !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if trimmed.chars().any(|c| !c.is_ascii_digit() && c != ',' && c != '.') {
        return None;
    }
    trimmed.replace(',', ".").parse::<Decimal>().ok()
}

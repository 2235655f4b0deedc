use std::collections::HashMap;
use std::sync::LazyLock;

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without", "cannot", "can't", "nothing",
];

const NEGATION_WINDOW: usize = 3;

/// Multiplier applied to a valence negated within the window.
const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCREMENT: f64 = 0.293;
const EXCLAMATION_INCREMENT: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
/// Normalization constant of the compound score.
const ALPHA: f64 = 15.0;

const BOOSTERS: &[&str] = &[
    "very", "extremely", "highly", "hugely", "incredibly", "really", "sharply",
    "significantly", "strongly", "substantially", "massively", "deeply",
    "exceptionally", "remarkably", "most", "more",
];

const DAMPENERS: &[&str] = &[
    "slightly", "somewhat", "marginally", "modestly", "partly", "little",
    "less", "kinda", "mildly",
];

/// Word valences on roughly [-3.5, 3.5]. Finance vocabulary first, general
/// polarity words after.
const VALENCES: &[(&str, f64)] = &[
    // finance, positive
    ("bullish", 2.6), ("rally", 2.0), ("rallies", 2.0), ("surge", 2.2), ("surges", 2.2),
    ("soar", 2.5), ("soars", 2.5), ("gain", 1.6), ("gains", 1.6), ("profit", 1.8),
    ("profitable", 1.9), ("growth", 1.7), ("beat", 1.8), ("beats", 1.8), ("upgrade", 2.0),
    ("upgraded", 2.0), ("outperform", 2.1), ("outperforms", 2.1), ("record", 1.5),
    ("rebound", 1.6), ("rebounds", 1.6), ("recovery", 1.5), ("dividend", 1.0),
    ("buyback", 1.3), ("upside", 1.6), ("accretive", 1.4), ("overweight", 1.2),
    ("exceed", 1.7), ("exceeds", 1.7), ("exceeded", 1.7), ("tailwind", 1.4),
    ("tailwinds", 1.4), ("raised", 1.0), ("expansion", 1.2), ("robust", 1.8),
    ("momentum", 1.0), ("breakthrough", 2.3), ("approval", 1.8), ("approved", 1.8),
    // finance, negative
    ("bearish", -2.6), ("decline", -1.6), ("declines", -1.6), ("loss", -1.8),
    ("losses", -1.8), ("plunge", -2.6), ("plunges", -2.6), ("crash", -3.0),
    ("crashes", -3.0), ("tumble", -2.2), ("tumbles", -2.2), ("slump", -2.0),
    ("miss", -1.7), ("misses", -1.7), ("missed", -1.7), ("downgrade", -2.0),
    ("downgraded", -2.0), ("underperform", -2.1), ("underweight", -1.2),
    ("drop", -1.5), ("drops", -1.5), ("fall", -1.4), ("falls", -1.4), ("selloff", -2.2),
    ("dilution", -1.5), ("dilutive", -1.5), ("headwind", -1.4), ("headwinds", -1.4),
    ("lawsuit", -1.8), ("litigation", -1.6), ("recall", -1.8), ("investigation", -1.7),
    ("default", -2.5), ("bankruptcy", -3.2), ("layoff", -1.9),
    ("layoffs", -1.9), ("downside", -1.6), ("overvalued", -1.4), ("bubble", -1.5),
    ("lowered", -1.1), ("suspended", -1.7), ("warning", -1.8), ("volatile", -0.8),
    ("fraud", -3.2), ("fine", -0.6), ("fined", -1.9), ("shortfall", -1.8),
    // general
    ("good", 1.9), ("great", 3.1), ("excellent", 3.2), ("strong", 2.3), ("positive", 2.6),
    ("optimistic", 2.2), ("success", 2.7), ("successful", 2.8), ("win", 2.8), ("wins", 2.8),
    ("improve", 1.9), ("improved", 2.1), ("improves", 1.9), ("impressive", 2.5),
    ("confident", 2.2), ("best", 3.2), ("boost", 1.7), ("boosts", 1.7), ("upbeat", 2.0),
    ("bad", -2.5), ("poor", -2.1), ("weak", -1.9), ("weaker", -1.9), ("negative", -2.7),
    ("pessimistic", -1.9), ("fail", -2.5), ("fails", -2.5), ("failed", -2.3),
    ("failure", -2.3), ("disappoint", -2.0), ("disappointing", -2.2), ("concern", -1.4),
    ("concerns", -1.4), ("fear", -2.2), ("fears", -2.2), ("risk", -1.1), ("risks", -1.1),
    ("trouble", -1.7), ("worst", -3.1), ("worse", -2.1), ("cut", -1.1), ("cuts", -1.1),
    ("uncertain", -1.2), ("uncertainty", -1.4), ("crisis", -3.1), ("struggle", -2.0),
    ("struggles", -2.0),
];

static LEXICON: LazyLock<HashMap<&'static str, f64>> =
    LazyLock::new(|| VALENCES.iter().copied().collect());

/// Lexicon-and-rule polarity model producing a compound score in [-1, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValenceModel;

impl ValenceModel {
    pub fn new() -> Self {
        Self
    }

    /// Compound polarity of `text`; 0.0 when no word carries valence.
    pub fn polarity(&self, text: &str) -> f64 {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return 0.0;
        }

        let mut valences: Vec<f64> = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| self.token_valence(&tokens, i, token))
            .collect();

        // contrast: "X but Y" shifts the weight onto Y
        if let Some(but) = tokens.iter().position(|t| t == "but") {
            for (i, v) in valences.iter_mut().enumerate() {
                if i < but {
                    *v *= 0.5;
                } else if i > but {
                    *v *= 1.5;
                }
            }
        }

        let mut sum: f64 = valences.iter().sum();
        if sum == 0.0 {
            return 0.0;
        }

        let exclamations = text.matches('!').count().min(MAX_EXCLAMATIONS) as f64;
        sum += sum.signum() * exclamations * EXCLAMATION_INCREMENT;

        normalize(sum)
    }

    fn token_valence(&self, tokens: &[String], i: usize, token: &str) -> f64 {
        let Some(&base) = LEXICON.get(token) else {
            return 0.0;
        };

        let mut valence = base;
        let preceding = &tokens[i.saturating_sub(NEGATION_WINDOW)..i];

        for (distance, word) in preceding.iter().rev().enumerate() {
            let scalar = booster_scalar(word, base);
            // farther boosters count for less
            valence += scalar * (1.0 - 0.05 * distance as f64);
        }

        if preceding.iter().any(|w| NEGATION_WORDS.contains(&w.as_str())) {
            valence *= NEGATION_SCALAR;
        }

        valence
    }
}

fn booster_scalar(word: &str, valence: f64) -> f64 {
    let magnitude = if BOOSTERS.contains(&word) {
        BOOSTER_INCREMENT
    } else if DAMPENERS.contains(&word) {
        -BOOSTER_INCREMENT
    } else {
        return 0.0;
    };

    if valence < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn normalize(sum: f64) -> f64 {
    (sum / (sum * sum + ALPHA).sqrt()).clamp(-1.0, 1.0)
}

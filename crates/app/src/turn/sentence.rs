use serde::{Deserialize, Serialize};

/// Tuning for the sentence accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    /// Soft flush once this many whitespace-delimited tokens accumulate
    /// with no sentence boundary; bounds first-audio latency.
    pub soft_flush_tokens: usize,
    /// Words after which a period does not end a sentence.
    pub abbreviations: Vec<String>,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            soft_flush_tokens: 40,
            abbreviations: ["M.", "Mme.", "Mr.", "Mrs.", "Dr.", "etc.", "e.g.", "i.e.", "vs."]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Groups model deltas into sentence-sized chunks for synthesis.
///
/// A boundary is `.`, `!` or `?` followed by whitespace (so decimals and
/// abbreviations hold), or a newline. Nothing is dropped and nothing is
/// duplicated: concatenating every flushed chunk plus the final remainder
/// reproduces the delta stream byte for byte.
pub struct SentenceAccumulator {
    cfg: AccumulatorConfig,
    buf: String,
}

impl SentenceAccumulator {
    pub fn new(cfg: AccumulatorConfig) -> Self {
        Self {
            cfg,
            buf: String::new(),
        }
    }

    /// Append a delta; returns every chunk that became ready.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buf.push_str(delta);
        let mut flushed = Vec::new();
        loop {
            if let Some(end) = self.find_boundary() {
                flushed.push(self.buf.drain(..end).collect());
            } else if self.buf.split_whitespace().count() >= self.cfg.soft_flush_tokens {
                flushed.push(std::mem::take(&mut self.buf));
            } else {
                break;
            }
        }
        flushed
    }

    /// Forced flush of whatever remains, used on stream end.
    pub fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    /// Drop buffered text, used on barge-in.
    pub fn discard(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn find_boundary(&self) -> Option<usize> {
        let mut chars = self.buf.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '\n' => return Some(i + 1),
                '.' | '!' | '?' => {
                    // a boundary needs following whitespace, so "3.5" and a
                    // period still being streamed both hold
                    let Some(&(_, next)) = chars.peek() else {
                        return None;
                    };
                    if !next.is_whitespace() {
                        continue;
                    }
                    if c == '.' && self.ends_with_abbreviation(i) {
                        continue;
                    }
                    return Some(i + 1);
                }
                _ => {}
            }
        }
        None
    }

    fn ends_with_abbreviation(&self, period_index: usize) -> bool {
        let word = self.buf[..=period_index]
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("");
        self.cfg.abbreviations.iter().any(|a| a == word)
    }
}

impl Default for SentenceAccumulator {
    fn default() -> Self {
        Self::new(AccumulatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc() -> SentenceAccumulator {
        SentenceAccumulator::default()
    }

    #[test]
    fn flushes_on_sentence_boundary() {
        let mut a = acc();
        assert!(a.push("Bonjour tout le monde").is_empty());
        let flushed = a.push(". Comment");
        assert_eq!(flushed, vec!["Bonjour tout le monde."]);
        assert_eq!(a.take_rest().unwrap(), " Comment");
    }

    #[test]
    fn newline_is_a_boundary() {
        let mut a = acc();
        let flushed = a.push("line one\nline two");
        assert_eq!(flushed, vec!["line one\n"]);
    }

    #[test]
    fn decimals_do_not_split() {
        let mut a = acc();
        assert!(a.push("It weighs 3.5 kilograms").is_empty());
        let flushed = a.push(" exactly. Yes");
        assert_eq!(flushed, vec!["It weighs 3.5 kilograms exactly."]);
    }

    #[test]
    fn abbreviations_do_not_split() {
        let mut a = acc();
        assert!(a.push("Dr. Martin est arrivé").is_empty());
        let flushed = a.push(". Bien");
        assert_eq!(flushed, vec!["Dr. Martin est arrivé."]);
    }

    #[test]
    fn soft_flush_after_token_budget() {
        let mut a = SentenceAccumulator::new(AccumulatorConfig {
            soft_flush_tokens: 5,
            ..Default::default()
        });
        let flushed = a.push("one two three four five six");
        assert_eq!(flushed.len(), 1);
        assert!(flushed[0].starts_with("one"));
        assert!(a.is_empty() || a.take_rest().is_some());
    }

    #[test]
    fn trailing_period_waits_for_next_delta() {
        let mut a = acc();
        // the period might be mid-number; hold until we see what follows
        assert!(a.push("Attendez").is_empty());
        assert!(a.push(".").is_empty());
        let flushed = a.push(" Voilà");
        assert_eq!(flushed, vec!["Attendez."]);
    }

    #[test]
    fn nothing_lost_nothing_duplicated() {
        let deltas = [
            "Bonjour, ",
            "comment ",
            "puis-je vous aider ",
            "? Je suis ",
            "là. Et ",
            "voilà",
        ];
        let mut a = acc();
        let mut out = String::new();
        for d in deltas {
            for chunk in a.push(d) {
                out.push_str(&chunk);
            }
        }
        if let Some(rest) = a.take_rest() {
            out.push_str(&rest);
        }
        assert_eq!(out, deltas.concat());
    }

    #[test]
    fn discard_empties_the_buffer() {
        let mut a = acc();
        a.push("half a sent");
        a.discard();
        assert!(a.take_rest().is_none());
    }
}

use crate::models::Figure;

/// More discoveries than this in a single cycle is treated as a probable
/// extraction malfunction, not a genuine inventory surge.
pub const DISCOVERY_VALVE: usize = 50;

#[derive(Debug, Default)]
pub struct Outcome {
    /// Listings with no equal-named entry in the previous cycle. Emptied when
    /// the safety valve trips.
    pub discovered: Vec<Figure>,
    /// Listings whose TTL ran out after consecutive absence; permanently
    /// dropped from the baseline.
    pub deleted: Vec<Figure>,
    pub valve_tripped: bool,
}

/// Holds one sub-site's listing set from the prior poll cycle and merges each
/// new cycle against it.
#[derive(Debug, Default)]
pub struct FigureStore {
    previous: Option<Vec<Figure>>,
}

impl FigureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the baseline from a persisted snapshot so a restart does not
    /// re-discover the whole inventory.
    pub fn with_baseline(figures: Vec<Figure>) -> Self {
        Self {
            previous: Some(figures),
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    pub fn baseline(&self) -> Option<&[Figure]> {
        self.previous.as_deref()
    }

    /// Compare the freshly scraped set against the previous cycle's set by
    /// name. The very first call only establishes the baseline and discovers
    /// nothing. A previously seen listing that is absent from the current set
    /// survives on its TTL: the counter is decremented and the listing is
    /// carried forward until the counter runs out, so transient disappearances
    /// (out-of-stock flicker, relist churn) do not flap. Afterwards the
    /// current set becomes the new baseline.
    pub fn reconcile(&mut self, mut current: Vec<Figure>) -> Outcome {
        let Some(previous) = self.previous.take() else {
            self.previous = Some(current);
            return Outcome::default();
        };

        let mut outcome = Outcome::default();

        for figure in &current {
            if !previous.iter().any(|p| p.name == figure.name) {
                outcome.discovered.push(figure.clone());
            }
        }

        for mut figure in previous {
            if current.iter().any(|c| c.name == figure.name) {
                continue;
            }
            if figure.ttl > 0 {
                figure.ttl -= 1;
            }
            if figure.ttl == 0 {
                tracing::info!("Figure '{}' is gone (TTL expired)", figure.name);
                outcome.deleted.push(figure);
            } else {
                tracing::debug!(
                    "Figure '{}' disappeared, carrying forward (TTL {})",
                    figure.name,
                    figure.ttl
                );
                current.push(figure);
            }
        }

        if outcome.discovered.len() > DISCOVERY_VALVE {
            tracing::warn!(
                "{} discoveries in one cycle exceeds the safety valve ({}); suppressing notifications",
                outcome.discovered.len(),
                DISCOVERY_VALVE
            );
            outcome.discovered.clear();
            outcome.valve_tripped = true;
        }

        self.previous = Some(current);
        outcome
    }
}

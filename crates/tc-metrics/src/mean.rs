/// Running mean of scalar observations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mean {
    total: f64,
    count: u64,
}

impl Mean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f64) {
        self.total += value;
        self.count += 1;
    }

    /// Mean of the observations since the last reset, or zero when empty.
    pub fn result(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn reset(&mut self) {
        self.total = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::Mean;

    #[test]
    fn averages_until_reset() {
        let mut mean = Mean::new();
        assert_eq!(mean.result(), 0.0);
        mean.update(1.0);
        mean.update(3.0);
        assert_eq!(mean.result(), 2.0);
        assert_eq!(mean.count(), 2);
        mean.reset();
        mean.update(5.0);
        assert_eq!(mean.result(), 5.0);
    }
}

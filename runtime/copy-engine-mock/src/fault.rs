//! Scripted failure plan

/// Let `skip` calls succeed, then fail the following `count` calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    skip: usize,
    count: usize,
}

impl FaultPlan {
    /// Never fail
    pub const NONE: FaultPlan = FaultPlan { skip: 0, count: 0 };

    /// Succeed `skip` times, then fail `count` times (`usize::MAX` = forever)
    pub const fn after(skip: usize, count: usize) -> Self {
        Self { skip, count }
    }

    /// Fail the next `count` calls
    pub const fn next(count: usize) -> Self {
        Self::after(0, count)
    }

    /// Fail every call until replaced
    pub const fn always() -> Self {
        Self::after(0, usize::MAX)
    }

    /// Consume one call; returns true if that call must fail
    pub fn should_fail(&mut self) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            return false;
        }
        match self.count {
            0 => false,
            usize::MAX => true,
            _ => {
                self.count -= 1;
                true
            }
        }
    }
}

use std::time::Duration;

use crate::stage::StagePlan;

/// The set of live virtual users the scheduler adjusts.
pub(crate) trait VuPool {
    /// Start one more virtual user. Must not wait for it to do any work.
    fn spawn(&mut self) -> anyhow::Result<()>;

    /// Signal the most recently started live virtual user to stop after its current iteration.
    fn retire(&mut self);

    /// The number of virtual users that have been spawned and not yet retired.
    fn live(&self) -> usize;
}

/// Drives the number of live virtual users to follow a [StagePlan].
#[derive(Debug)]
pub(crate) struct StageScheduler {
    plan: StagePlan,
    spawned: usize,
    retired: usize,
    peak: usize,
}

impl StageScheduler {
    pub(crate) fn new(plan: StagePlan) -> Self {
        Self {
            plan,
            spawned: 0,
            retired: 0,
            peak: 0,
        }
    }

    pub(crate) fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// Zero once every stage has run, otherwise the plan's target.
    pub(crate) fn desired_vus(&self, elapsed: Duration) -> usize {
        if self.plan.is_finished(elapsed) {
            0
        } else {
            self.plan.target_at(elapsed)
        }
    }

    /// Spawn or retire virtual users so the pool matches the desired count at `elapsed`.
    pub(crate) fn reconcile(
        &mut self,
        elapsed: Duration,
        pool: &mut impl VuPool,
    ) -> anyhow::Result<()> {
        let desired = self.desired_vus(elapsed);
        let live = pool.live();

        if desired > live {
            log::debug!("Scaling up from {} to {} VUs", live, desired);
            for _ in live..desired {
                pool.spawn()?;
                self.spawned += 1;
            }
        } else if desired < live {
            log::debug!("Scaling down from {} to {} VUs", live, desired);
            for _ in desired..live {
                pool.retire();
                self.retired += 1;
            }
        }

        self.peak = self.peak.max(pool.live());

        Ok(())
    }

    /// Retire every live virtual user.
    pub(crate) fn stop_all(&mut self, pool: &mut impl VuPool) {
        for _ in 0..pool.live() {
            pool.retire();
            self.retired += 1;
        }
    }

    /// How long to wait before the next control tick. Never sleeps past the end of the plan.
    pub(crate) fn next_tick(&self, elapsed: Duration, tick_interval: Duration) -> Duration {
        let remaining = self.plan.total_duration().saturating_sub(elapsed);
        tick_interval.min(remaining)
    }

    pub(crate) fn spawned(&self) -> usize {
        self.spawned
    }

    pub(crate) fn retired(&self) -> usize {
        self.retired
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak
    }
}

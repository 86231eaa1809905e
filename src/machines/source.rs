//! Boundary producer of PCB stacks.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::clock::secs;
use crate::config::{ConfigError, ConfigResult};
use crate::error::SimResult;
use crate::kernel::{Condition, Context, Process, Suspend, Wake};
use crate::pcb::{Item, Pcb, Stack};
use crate::types::{SimTime, SlotId};

use super::{place_checked, start_offset, wait_for_start};

/// Source parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceParams {
    /// Seconds between placing a stack and building the next one
    pub delay: u64,
    /// Type of every board created
    pub pcb_type: u32,
    pub start_time: f64,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            delay: 0,
            pcb_type: 1,
            start_time: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Build,
    Place,
}

/// Creates `batch_size` boards in stacks of `stack_size` and places the
/// stacks one at a time on its output slot.
#[derive(Debug)]
pub struct Source {
    name: String,
    output: SlotId,
    pcb_type: u32,
    delay: SimTime,
    start: SimTime,
    batch_size: u64,
    stack_size: u64,
    phase: Phase,
    pending: Option<Stack>,
    created: u64,
}

impl Source {
    /// Creates a source. The batch must be a whole number of stacks.
    pub fn new(
        name: impl Into<String>,
        params: &SourceParams,
        output: SlotId,
        batch_size: u64,
        stack_size: u64,
    ) -> ConfigResult<Self> {
        let name = name.into();
        if stack_size == 0 || batch_size % stack_size != 0 {
            return Err(ConfigError::Validation(format!(
                "{}: batch size {} is not a multiple of stack size {}",
                name, batch_size, stack_size
            )));
        }
        Ok(Self {
            name,
            output,
            pcb_type: params.pcb_type,
            delay: secs(params.delay),
            start: start_offset(params.start_time),
            batch_size,
            stack_size,
            phase: Phase::Start,
            pending: None,
            created: 0,
        })
    }

    /// Boards created so far, including a stack not yet placed.
    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    fn build(&mut self, now: SimTime) -> Stack {
        let first = self.created + 1;
        self.created += self.stack_size;
        (first..=self.created)
            .map(|serial| Pcb::new(self.pcb_type, serial, now))
            .collect()
    }
}

impl Process for Source {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        loop {
            match self.phase {
                Phase::Start => {
                    self.phase = Phase::Build;
                    if let Some(wait) = wait_for_start(self.start) {
                        return Ok(wait);
                    }
                }
                Phase::Build => {
                    if self.created >= self.batch_size {
                        tracing::info!(source = %self.name, created = self.created, "batch complete");
                        return Ok(Suspend::Finish);
                    }
                    self.pending = Some(self.build(ctx.now()));
                    self.phase = Phase::Place;
                }
                Phase::Place => {
                    if !ctx.world().slot(self.output).can_put() {
                        return Ok(Suspend::Until(Condition::CanPut(self.output)));
                    }
                    if let Some(stack) = self.pending.take() {
                        place_checked(ctx, &self.name, self.output, Item::Stack(stack))?;
                    }
                    self.phase = Phase::Build;
                    return Ok(Suspend::For(self.delay));
                }
            }
        }
    }

    fn held_items(&self) -> usize {
        self.pending.as_ref().map_or(0, Stack::len)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, World};
    use crate::machines::mock::Collector;

    #[test]
    fn test_batch_must_divide_into_stacks() {
        let out = World::new().add_slot("out");
        let params = SourceParams::default();
        assert!(Source::new("src", &params, out, 10, 4).is_err());
        assert!(Source::new("src", &params, out, 10, 0).is_err());
        assert!(Source::new("src", &params, out, 12, 4).is_ok());
    }

    #[test]
    fn test_creates_batch_in_stacks() {
        let mut world = World::new();
        let out = world.add_slot("out");
        let mut kernel = Kernel::new(world);
        let params = SourceParams {
            delay: 3,
            pcb_type: 2,
            ..SourceParams::default()
        };
        let source = kernel.spawn(Box::new(Source::new("src", &params, out, 8, 4).unwrap()));
        let collector = kernel.spawn(Box::new(Collector::new("collector", out)));

        kernel.run().unwrap();

        assert!(kernel.is_finished(source));
        assert_eq!(kernel.process::<Source>(source).unwrap().created(), 8);
        let collector = kernel.process::<Collector>(collector).unwrap();
        assert_eq!(collector.pcb_count, 8);
        assert_eq!(collector.received, vec![(0, 1), (secs(3), 5)]);
    }
}

//! Solder paste screen printer.
//!
//! Every board consumes solder paste and adhesive according to its type. When
//! a reserve is short the printer asks its operator for a refill and blocks
//! until the reserve holds enough again. After every `num_pcbs_per_cleaning`
//! boards the stencil is cleaned.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::clock::{secs, until_next_tick, HALF_TICK, TICK};
use crate::error::{SimError, SimResult};
use crate::kernel::{Condition, Context, Interrupt, Process, Suspend, Wake, World};
use crate::pcb::{Item, PcbCatalog};
use crate::stats::{EntityReport, StateSet, StateTracker};
use crate::types::{ProcessId, ReserveId, SimTime, SlotId, TaskKind};

use super::{place_checked, start_offset, wait_for_start};

/// Printer parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterParams {
    /// Seconds per board
    pub printing_delay: u64,
    pub cleaning_delay: u64,
    pub num_pcbs_per_cleaning: u32,
    /// Solder paste reserve in grams
    pub solder_capacity_g: f64,
    pub solder_initial_g: f64,
    /// Adhesive reserve in grams
    pub adhesive_capacity_g: f64,
    pub adhesive_initial_g: f64,
    pub start_time: f64,
    /// Power per state: idle, waiting_for_refill, printing, cleaning, waiting_to_output
    pub power_w: Vec<f64>,
}

impl Default for PrinterParams {
    fn default() -> Self {
        Self {
            printing_delay: 18,
            cleaning_delay: 28,
            num_pcbs_per_cleaning: 2,
            solder_capacity_g: 500.0,
            solder_initial_g: 500.0,
            adhesive_capacity_g: 500.0,
            adhesive_initial_g: 500.0,
            start_time: 0.0,
            power_w: Vec::new(),
        }
    }
}

/// Reserves of one printer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Consumables {
    pub solder: ReserveId,
    pub adhesive: ReserveId,
}

impl Consumables {
    /// Adds a printer's solder and adhesive reserves to the world.
    pub fn install(world: &mut World, printer: &str, params: &PrinterParams) -> Self {
        Self {
            solder: world.add_reserve(
                format!("{}.solder", printer),
                params.solder_capacity_g,
                params.solder_initial_g,
            ),
            adhesive: world.add_reserve(
                format!("{}.adhesive", printer),
                params.adhesive_capacity_g,
                params.adhesive_initial_g,
            ),
        }
    }
}

/// Printer states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrinterState {
    Idle,
    WaitingForRefill,
    Printing,
    Cleaning,
    WaitingToOutput,
}

impl StateSet for PrinterState {
    const ALL: &'static [Self] = &[
        PrinterState::Idle,
        PrinterState::WaitingForRefill,
        PrinterState::Printing,
        PrinterState::Cleaning,
        PrinterState::WaitingToOutput,
    ];

    fn name(self) -> &'static str {
        match self {
            PrinterState::Idle => "idle",
            PrinterState::WaitingForRefill => "waiting_for_refill",
            PrinterState::Printing => "printing",
            PrinterState::Cleaning => "cleaning",
            PrinterState::WaitingToOutput => "waiting_to_output",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Idle,
    GetSolder,
    GetAdhesive,
    BeginPrint,
    PrintDone,
    Output,
    OutputRetry,
    Place,
    AfterPlace,
    CleanDone,
}

/// A screen printer between two slots.
#[derive(Debug)]
pub struct ScreenPrinter {
    name: String,
    input: SlotId,
    output: SlotId,
    operator: ProcessId,
    consumables: Consumables,
    catalog: PcbCatalog,
    printing_delay: SimTime,
    cleaning_delay: SimTime,
    num_pcbs_per_cleaning: u32,
    start: SimTime,
    phase: Phase,
    held: Option<Item>,
    /// Solder and adhesive needed for the held item
    need: (f64, f64),
    since_cleaning: u32,
    printed: u64,
    refills_requested: u64,
    tracker: StateTracker<PrinterState>,
}

impl ScreenPrinter {
    /// Creates a printer that asks `operator` for refills of `consumables`.
    pub fn new(
        name: impl Into<String>,
        params: &PrinterParams,
        catalog: PcbCatalog,
        input: SlotId,
        output: SlotId,
        operator: ProcessId,
        consumables: Consumables,
    ) -> Self {
        let name = name.into();
        Self {
            tracker: StateTracker::new(name.clone(), PrinterState::Idle).with_power(&params.power_w),
            name,
            input,
            output,
            operator,
            consumables,
            catalog,
            printing_delay: secs(params.printing_delay),
            cleaning_delay: secs(params.cleaning_delay),
            num_pcbs_per_cleaning: params.num_pcbs_per_cleaning,
            start: start_offset(params.start_time),
            phase: Phase::Start,
            held: None,
            need: (0.0, 0.0),
            since_cleaning: 0,
            printed: 0,
            refills_requested: 0,
        }
    }

    pub fn state(&self) -> PrinterState {
        self.tracker.state()
    }

    pub fn consumables(&self) -> Consumables {
        self.consumables
    }

    /// Boards printed and handed on.
    pub fn printed(&self) -> u64 {
        self.printed
    }

    /// Refill requests sent to the operator.
    pub fn refills_requested(&self) -> u64 {
        self.refills_requested
    }

    /// Solder and adhesive required by every board of an item.
    fn requirement(&self, item: &Item) -> SimResult<(f64, f64)> {
        let mut need = (0.0, 0.0);
        let mut add = |type_id: u32| -> SimResult<()> {
            let info = self.catalog.get(type_id).ok_or_else(|| SimError::UnknownPcbType {
                entity: self.name.clone(),
                type_id,
            })?;
            need.0 += info.solder_g;
            need.1 += info.adhesive_g;
            Ok(())
        };
        match item {
            Item::Pcb(pcb) => add(pcb.type_id)?,
            Item::Stack(stack) => {
                for pcb in stack {
                    add(pcb.type_id)?;
                }
            }
        }
        Ok(need)
    }

    fn request(&mut self, ctx: &mut Context<'_>, task: TaskKind) {
        tracing::debug!(printer = %self.name, %task, "reserve low, requesting refill");
        self.refills_requested += 1;
        ctx.interrupt(self.operator, Interrupt::new(self.name.clone(), task));
    }

    fn receive(&mut self, ctx: &mut Context<'_>) -> SimResult<Option<Suspend>> {
        let Some(item) = ctx.take(&self.name, self.input) else {
            return Ok(Some(Suspend::For(TICK)));
        };
        self.need = self.requirement(&item)?;
        self.held = Some(item);

        let world = ctx.world();
        let solder_short = !world.reserve(self.consumables.solder).can_get(self.need.0);
        let adhesive_short = !world.reserve(self.consumables.adhesive).can_get(self.need.1);
        if solder_short {
            self.request(ctx, TaskKind::SolderRefill);
        }
        if adhesive_short {
            self.request(ctx, TaskKind::AdhesiveRefill);
        }
        if solder_short || adhesive_short {
            self.tracker.enter(ctx, PrinterState::WaitingForRefill);
        }
        self.phase = Phase::GetSolder;
        Ok(None)
    }

    /// Takes `amount` from a reserve, or returns the wait for it.
    fn consume(ctx: &mut Context<'_>, reserve: ReserveId, amount: f64) -> Option<Suspend> {
        if ctx.world_mut().reserve_mut(reserve).get(amount) {
            None
        } else {
            Some(Suspend::Until(Condition::Level { reserve, amount }))
        }
    }
}

impl Process for ScreenPrinter {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        loop {
            match self.phase {
                Phase::Start => {
                    self.phase = Phase::Idle;
                    if let Some(wait) = wait_for_start(self.start) {
                        return Ok(wait);
                    }
                }
                Phase::Idle => {
                    if let Some(wait) = self.receive(ctx)? {
                        return Ok(wait);
                    }
                }
                Phase::GetSolder => {
                    if let Some(wait) = Self::consume(ctx, self.consumables.solder, self.need.0) {
                        return Ok(wait);
                    }
                    self.phase = Phase::GetAdhesive;
                }
                Phase::GetAdhesive => {
                    if let Some(wait) = Self::consume(ctx, self.consumables.adhesive, self.need.1) {
                        return Ok(wait);
                    }
                    self.phase = Phase::BeginPrint;
                    let wait = until_next_tick(ctx.now());
                    if wait > 0 {
                        return Ok(Suspend::For(wait));
                    }
                }
                Phase::BeginPrint => {
                    self.tracker.enter(ctx, PrinterState::Printing);
                    self.phase = Phase::PrintDone;
                    return Ok(Suspend::For(self.printing_delay.saturating_sub(TICK)));
                }
                Phase::PrintDone => {
                    self.since_cleaning += 1;
                    self.phase = Phase::Output;
                }
                Phase::Output => {
                    if ctx.world().slot(self.output).can_put() {
                        self.phase = Phase::Place;
                        return Ok(Suspend::For(HALF_TICK));
                    }
                    self.phase = Phase::OutputRetry;
                    return Ok(Suspend::For(TICK));
                }
                Phase::OutputRetry => {
                    self.tracker.enter(ctx, PrinterState::WaitingToOutput);
                    self.phase = Phase::Output;
                }
                Phase::Place => {
                    if let Some(item) = self.held.take() {
                        place_checked(ctx, &self.name, self.output, item)?;
                        self.printed += 1;
                    }
                    self.phase = Phase::AfterPlace;
                    return Ok(Suspend::For(HALF_TICK));
                }
                Phase::AfterPlace => {
                    if self.since_cleaning >= self.num_pcbs_per_cleaning {
                        self.tracker.enter(ctx, PrinterState::Cleaning);
                        self.phase = Phase::CleanDone;
                        return Ok(Suspend::For(self.cleaning_delay));
                    }
                    self.tracker.enter(ctx, PrinterState::Idle);
                    self.phase = Phase::Idle;
                }
                Phase::CleanDone => {
                    self.since_cleaning = 0;
                    self.tracker.enter(ctx, PrinterState::Idle);
                    self.phase = Phase::Idle;
                }
            }
        }
    }

    fn held_items(&self) -> usize {
        self.held.as_ref().map_or(0, Item::pcb_count)
    }

    fn report(&self, now: SimTime) -> Option<EntityReport> {
        Some(
            self.tracker
                .report("screen_printer", now)
                .with_counter("printed", self.printed)
                .with_counter("refills_requested", self.refills_requested),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

use crate::ecs::World;
use rayon::prelude::*;
use std::time::{Duration, Instant};

pub trait System: Send {
    fn run(&mut self, world: &mut World, frame: u64);
}

pub trait ParallelSystem: Send {
    fn run(&mut self, world: &World, frame: u64);
}

/// Frame stages, executed in declaration order.
///
/// Activation runs before Correction and both run before Input, so a mode
/// change made while polling input takes effect on the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Startup,
    Activation,
    Correction,
    Input,
    Diagnostics,
}

impl Stage {
    pub const fn ordered() -> [Stage; 5] {
        [
            Stage::Startup,
            Stage::Activation,
            Stage::Correction,
            Stage::Input,
            Stage::Diagnostics,
        ]
    }

    pub const fn count() -> usize {
        5
    }

    pub fn index(self) -> usize {
        match self {
            Stage::Startup => 0,
            Stage::Activation => 1,
            Stage::Correction => 2,
            Stage::Input => 3,
            Stage::Diagnostics => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Startup => "Startup",
            Stage::Activation => "Activation",
            Stage::Correction => "Correction",
            Stage::Input => "Input",
            Stage::Diagnostics => "Diagnostics",
        }
    }

    fn read_only(self) -> bool {
        matches!(self, Stage::Diagnostics)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameProfile {
    stages: Vec<StageProfile>,
}

impl FrameProfile {
    pub fn stages(&self) -> &[StageProfile] {
        &self.stages
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageProfile> {
        self.stages.iter().find(|profile| profile.stage == stage)
    }
}

#[derive(Debug, Clone)]
pub struct StageProfile {
    pub stage: Stage,
    pub total: Duration,
    pub sequential_systems: Vec<SystemProfile>,
    pub parallel_count: usize,
    pub read_only_violation: bool,
}

impl StageProfile {
    pub fn total_ms(&self) -> f32 {
        self.total.as_secs_f64() as f32 * 1000.0
    }
}

#[derive(Debug, Clone)]
pub struct SystemProfile {
    pub name: &'static str,
    pub duration: Duration,
}

const SLOW_SYSTEM_THRESHOLD_MS: f64 = 2.0;

struct SystemEntry {
    name: &'static str,
    system: Box<dyn System>,
}

struct ParallelEntry {
    name: &'static str,
    system: Box<dyn ParallelSystem>,
}

struct StageBucket {
    stage: Stage,
    sequential: Vec<SystemEntry>,
    parallel: Vec<ParallelEntry>,
}

impl StageBucket {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            sequential: Vec::new(),
            parallel: Vec::new(),
        }
    }
}

/// Runs registered systems against the world once per frame, stage by stage.
pub struct Scheduler {
    world: World,
    buckets: Vec<StageBucket>,
    last_profile: FrameProfile,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(World::default())
    }
}

impl Scheduler {
    pub fn new(world: World) -> Self {
        let buckets = Stage::ordered().into_iter().map(StageBucket::new).collect();
        Self {
            world,
            buckets,
            last_profile: FrameProfile::default(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn last_profile(&self) -> &FrameProfile {
        &self.last_profile
    }

    pub fn add_system<S>(&mut self, stage: Stage, name: &'static str, system: S)
    where
        S: System + 'static,
    {
        self.bucket_mut(stage).sequential.push(SystemEntry {
            name,
            system: Box::new(system),
        });
    }

    pub fn add_system_fn<F>(&mut self, stage: Stage, name: &'static str, func: F)
    where
        F: FnMut(&mut World, u64) + Send + 'static,
    {
        self.add_system(stage, name, FnSystem { func });
    }

    pub fn add_parallel_system<P>(&mut self, stage: Stage, name: &'static str, system: P)
    where
        P: ParallelSystem + 'static,
    {
        self.bucket_mut(stage).parallel.push(ParallelEntry {
            name,
            system: Box::new(system),
        });
    }

    pub fn add_parallel_system_fn<F>(&mut self, stage: Stage, name: &'static str, func: F)
    where
        F: Fn(&World, u64) + Send + Sync + 'static,
    {
        self.add_parallel_system(stage, name, FnParallelSystem { func });
    }

    pub fn tick(&mut self, frame: u64) {
        let mut frame_profile = FrameProfile::default();

        for bucket in &mut self.buckets {
            let stage_start = Instant::now();
            let mut sequential_systems = Vec::with_capacity(bucket.sequential.len());

            for entry in &mut bucket.sequential {
                log::trace!("[scheduler::{:?}] running {}", bucket.stage, entry.name);
                let system_start = Instant::now();
                entry.system.run(&mut self.world, frame);
                let duration = system_start.elapsed();

                if duration.as_secs_f64() * 1000.0 > SLOW_SYSTEM_THRESHOLD_MS {
                    log::warn!(
                        "[scheduler::{:?}] system {} took {:.3} ms",
                        bucket.stage,
                        entry.name,
                        duration.as_secs_f64() * 1000.0,
                    );
                }
                sequential_systems.push(SystemProfile {
                    name: entry.name,
                    duration,
                });
            }

            if !bucket.parallel.is_empty() {
                let world = &self.world;
                let stage = bucket.stage;
                bucket.parallel.par_iter_mut().for_each(|entry| {
                    log::trace!("[scheduler::{stage:?}] running parallel {}", entry.name);
                    entry.system.run(world, frame);
                });
            }

            let read_only_violation = bucket.stage.read_only() && !bucket.sequential.is_empty();
            if read_only_violation {
                log::warn!(
                    "[scheduler::{:?}] read-only stage ran {} exclusive system(s)",
                    bucket.stage,
                    bucket.sequential.len()
                );
            }

            frame_profile.stages.push(StageProfile {
                stage: bucket.stage,
                total: stage_start.elapsed(),
                sequential_systems,
                parallel_count: bucket.parallel.len(),
                read_only_violation,
            });
        }

        self.last_profile = frame_profile;
    }

    fn bucket_mut(&mut self, stage: Stage) -> &mut StageBucket {
        &mut self.buckets[stage.index()]
    }
}

struct FnSystem<F: FnMut(&mut World, u64) + Send + 'static> {
    func: F,
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World, u64) + Send + 'static,
{
    fn run(&mut self, world: &mut World, frame: u64) {
        (self.func)(world, frame);
    }
}

struct FnParallelSystem<F: Fn(&World, u64) + Send + Sync + 'static> {
    func: F,
}

impl<F> ParallelSystem for FnParallelSystem<F>
where
    F: Fn(&World, u64) + Send + Sync + 'static,
{
    fn run(&mut self, world: &World, frame: u64) {
        (self.func)(world, frame);
    }
}

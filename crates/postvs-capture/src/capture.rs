//! The capture engine: per-event capture driven from replay callbacks, plus the cache viewers
//! read from.

use std::sync::Arc;

use anyhow::Context as _;

use crate::cache::{MeshDataStage, PostVsCache, PostVsRecord, StageOutputRecord};
use crate::config::PostVsConfig;
use crate::device::{CaptureDevice, PipelineDesc};
use crate::error::CaptureError;
use crate::mesh::MeshDescriptor;
use crate::oom::OomScope;
use crate::pipeline_patch::stream_out_root_signature;
use crate::post_stage::capture_post_stage;
use crate::replay::{ActionCallback, DrawContext, ReplayMode, Replayer};
use crate::scratch::ScratchBufferSet;
use crate::session::CaptureSession;
use crate::stats::CaptureStats;
use crate::vertex_stage::capture_vertex_stage;

/// Captures post-transform vertex data for recorded draws.
///
/// Owns the device handle, the shared scratch buffers and the per-event cache. Only one capture
/// runs at a time; every method takes `&mut self`.
pub struct PostVsCapture<D: CaptureDevice> {
    device: D,
    config: PostVsConfig,
    scratch: ScratchBufferSet,
    cache: PostVsCache,
    stats: Arc<CaptureStats>,
}

impl<D: CaptureDevice> PostVsCapture<D> {
    pub fn new(device: D) -> Self {
        Self::with_config(device, PostVsConfig::default())
    }

    pub fn with_config(device: D, config: PostVsConfig) -> Self {
        Self {
            device,
            config,
            scratch: ScratchBufferSet::new(),
            cache: PostVsCache::default(),
            stats: Arc::new(CaptureStats::new()),
        }
    }

    pub fn config(&self) -> &PostVsConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    /// Current size of the shared stream-out scratch buffers.
    pub fn scratch_capacity(&self) -> u64 {
        self.scratch.capacity()
    }

    /// Number of cached records (aliases not included).
    pub fn cached_events(&self) -> usize {
        self.cache.len()
    }

    /// Captures `event_id` unless it (or the event it aliases) already has a record.
    ///
    /// Capture failures end up as statuses in the record. An error is only returned when the
    /// replay itself fails.
    pub fn capture<R>(&mut self, replayer: &mut R, event_id: u32) -> anyhow::Result<()>
    where
        R: Replayer + ?Sized,
    {
        self.capture_batch(replayer, &[event_id])
    }

    /// Captures several events of one command-list segment with a single replay.
    ///
    /// `events` must belong to the same segment, so replaying from the first to the last reaches
    /// each of them in order. Events the replayer doesn't know as actions are skipped.
    pub fn capture_batch<R>(&mut self, replayer: &mut R, events: &[u32]) -> anyhow::Result<()>
    where
        R: Replayer + ?Sized,
    {
        let mut pending = Vec::with_capacity(events.len());
        for &event_id in events {
            self.stats.inc_capture_requests();
            if self.cache.contains(event_id) {
                self.stats.inc_cache_hits();
                continue;
            }
            // Aliases are captured by replaying the event they stand for.
            let primary = self.cache.resolve(event_id);
            if replayer.action(primary).is_some() {
                pending.push(primary);
            } else {
                tracing::debug!(event_id = primary, "not an action, nothing to capture");
            }
        }
        pending.sort_unstable();
        pending.dedup();
        let (Some(&first), Some(&last)) = (pending.first(), pending.last()) else {
            return Ok(());
        };

        let mut hook = CaptureHook {
            capture: self,
            events: &pending,
        };

        // Bring the device to the state right before the first event, then run through the
        // requested range with the hook installed.
        replayer
            .replay_log(0, first, ReplayMode::WithoutDraw, &mut hook)
            .with_context(|| format!("replaying up to event {first}"))
            .inspect_err(|err| tracing::error!("{err:#}"))?;
        replayer
            .replay_log(first, last, ReplayMode::Full, &mut hook)
            .with_context(|| format!("replaying events {first}..={last}"))
            .inspect_err(|err| tracing::error!("{err:#}"))?;

        Ok(())
    }

    /// Makes `alias` share whatever record `primary` resolves to.
    pub fn register_alias(&mut self, primary: u32, alias: u32) {
        self.cache.register_alias(primary, alias);
    }

    /// The record `event_id` resolves to, if it was captured.
    pub fn record(&self, event_id: u32) -> Option<&PostVsRecord> {
        self.cache.get(event_id)
    }

    pub fn mesh_format(
        &self,
        event_id: u32,
        instance_id: u32,
        stage: MeshDataStage,
    ) -> MeshDescriptor {
        MeshDescriptor::from_record(self.cache.get(event_id), instance_id, stage)
    }

    /// Drops every record and alias, releasing the buffers they own.
    pub fn clear(&mut self) {
        self.cache.clear(&mut self.device);
    }

    fn capture_action(&mut self, ctx: &DrawContext<'_>) {
        if self.cache.contains(ctx.event_id) {
            return;
        }
        let record = self.build_record(ctx);
        self.cache.insert(ctx.event_id, record);
        self.stats.inc_records_created();
    }

    fn build_record(&mut self, ctx: &DrawContext<'_>) -> PostVsRecord {
        let event_id = ctx.event_id;
        let _span = tracing::debug_span!("postvs", event_id).entered();

        let Self {
            device,
            config,
            scratch,
            stats,
            ..
        } = self;
        let mut device = OomScope::enter(device);

        let precondition_failed = |err: CaptureError| {
            err.log(event_id);
            PostVsRecord::failed(&err)
        };

        let state = ctx.state;
        let Some(bound) = &state.pipeline else {
            return precondition_failed(CaptureError::NoPipeline);
        };
        let PipelineDesc::Graphics(pipeline) = bound.desc.as_ref() else {
            return precondition_failed(CaptureError::NotGraphicsPipeline);
        };
        let Some(vs) = &pipeline.vs else {
            return precondition_failed(CaptureError::NoVertexShader);
        };

        let action = *ctx.action;
        let empty = if action.num_indices == 0 {
            Some(CaptureError::EmptyDrawElements)
        } else if action.num_instances == 0 {
            Some(CaptureError::EmptyDrawInstances)
        } else {
            None
        };
        if let Some(err) = empty {
            return PostVsRecord {
                vs_in_topology: state.topology,
                ..precondition_failed(err)
            };
        }

        let last_stage = pipeline.last_pre_raster_stage();
        let mut record = PostVsRecord {
            vs_in_topology: state.topology,
            vertex: StageOutputRecord::default(),
            // Replaced once the post stage actually runs.
            post: StageOutputRecord::failed(if last_stage.is_some() {
                &CaptureError::VertexStageFailed
            } else {
                &CaptureError::NoPostStage
            }),
        };

        let root_signature =
            match stream_out_root_signature(&mut *device, state.graphics_root_signature.as_ref()) {
                Ok(sig) => sig,
                Err(err) => {
                    let err = CaptureError::RootSignature(err);
                    err.log(event_id);
                    record.vertex = StageOutputRecord::failed(&err);
                    return record;
                }
            };

        let mut session = CaptureSession {
            device: &mut *device,
            scratch,
            config,
            stats,
            event_id,
            action,
            state: Arc::new(state.clone()),
            root_signature,
        };

        match capture_vertex_stage(&mut session, pipeline, vs) {
            Ok(vertex) => {
                record.vertex = vertex;
                if let Some(last_stage) = last_stage {
                    record.post = capture_post_stage(&mut session, pipeline, last_stage)
                        .unwrap_or_else(|err| {
                            err.log(event_id);
                            StageOutputRecord::failed(&err)
                        });
                }
            }
            Err(err) => {
                err.log(event_id);
                record.vertex = StageOutputRecord::failed(&err);
            }
        }

        if let Some(sig) = root_signature {
            device.release_root_signature(sig);
        }

        record
    }
}

impl<D: CaptureDevice> Drop for PostVsCapture<D> {
    fn drop(&mut self) {
        self.cache.clear(&mut self.device);
        self.scratch.release(&mut self.device);
    }
}

/// Replay callback that captures the requested events as the replayer reaches them.
struct CaptureHook<'a, D: CaptureDevice> {
    capture: &'a mut PostVsCapture<D>,
    events: &'a [u32],
}

impl<D: CaptureDevice> ActionCallback for CaptureHook<'_, D> {
    fn pre_draw(&mut self, ctx: &DrawContext<'_>) {
        if self.events.contains(&ctx.event_id) {
            self.capture.capture_action(ctx);
        }
    }

    // Dispatches don't produce vertex data.
    fn pre_dispatch(&mut self, _event_id: u32) {}

    fn alias_event(&mut self, primary: u32, alias: u32) {
        if self.events.contains(&primary) {
            self.capture.register_alias(primary, alias);
        }
    }
}

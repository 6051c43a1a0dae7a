//! Frame loop demo on the dummy backend.
//!
//! Builds the usual per-frame graph once and drives it for a number of
//! cycles:
//!
//! ```text
//! advance frame -> wait fence -> acquire -> reset fence -> render -> submit -> present
//! ```
//!
//! Command buffers, semaphores and fences are selected per frame in flight,
//! the presented image by the acquire step. An out-of-date surface can be
//! injected to show recovery.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=trace cargo run --example frame_loop -- --frames 8 --out-of-date-at 3
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use framegraph::backend::dummy::DummyBackend;
use framegraph::{
    AcquireTask, BackendError, CommandBufferProvider, CustomTask, FenceAction, FenceTask,
    PresentTask, RenderTask, ResourceHandle, SubmitTask, TaskGraph, TaskGraphConfig,
};

/// Drive a compiled frame graph on the dummy backend.
#[derive(Parser, Debug)]
#[command(name = "frame_loop", about = "Run a compiled frame graph on the dummy backend")]
struct Args {
    /// Number of cycles to execute.
    #[arg(long, default_value_t = 5)]
    frames: u64,

    /// Frames in flight (command buffer / semaphore / fence slots).
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    slots: u32,

    /// Presentable images on the surface.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    images: u32,

    /// Make the acquire of this cycle report an out-of-date surface.
    #[arg(long)]
    out_of_date_at: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let slots = args.slots as usize;

    let backend = Arc::new(DummyBackend::new());
    let surface = backend.create_surface(args.images);
    let queue = backend.create_queue("graphics");
    let command_buffers = backend.create_command_buffers("frame", slots);
    let render_finished = backend.create_semaphores(slots);
    let image_available = backend.create_semaphores(slots);
    let in_flight = backend.create_fences(slots, true);

    let config = TaskGraphConfig::new("frame_loop").with_fence_timeout(Duration::from_secs(1));
    let mut graph = TaskGraph::with_config(Arc::clone(&backend), config);

    let image = graph.add_index_provider(args.images as usize);
    let frame_slot = graph.add_index_provider(slots);
    let frames = CommandBufferProvider::<DummyBackend>::new(
        &frame_slot,
        &command_buffers,
        &render_finished,
        &in_flight,
    )?;

    let advance = {
        let frames = frames.clone();
        graph.add_task(CustomTask::<DummyBackend>::new("advance frame", move |_| {
            frames.advance().map(|_| ())
        }))
    };
    let wait = graph.add_task(
        FenceTask::<DummyBackend>::new("wait in flight", FenceAction::WAIT)
            .with_fence(frames.fence()),
    );
    let acquire = graph.add_task(
        AcquireTask::<DummyBackend>::new("acquire", &surface, &image)
            .with_signal(ResourceHandle::indexed(&image_available, &frame_slot)),
    );
    let reset = graph.add_task(
        FenceTask::<DummyBackend>::new("reset in flight", FenceAction::RESET)
            .with_fence(frames.fence()),
    );
    let render = {
        let image = image.clone();
        graph.add_task(
            RenderTask::<DummyBackend>::new("render", frames.command_buffer(), move |ctx| {
                ctx.command_buffer.reset();
                ctx.command_buffer.record(format!(
                    "frame {} draws into image {:?}",
                    ctx.frame,
                    image.get()
                ));
                Ok(())
            })
            .with_index(&frame_slot),
        )
    };
    let submit = graph.add_task(
        SubmitTask::<DummyBackend>::new("submit", &queue)
            .with_command_buffer(frames.command_buffer())
            .with_signal(frames.semaphore())
            .with_fence(frames.fence()),
    );
    let present = graph.add_task(PresentTask::<DummyBackend>::new(
        "present", &queue, &surface, &image,
    ));

    for (before, after) in [
        (advance, wait),
        (wait, acquire),
        (acquire, reset),
        (reset, render),
        (render, submit),
        (submit, present),
    ] {
        graph.add_dependency(before, after);
    }

    let mut compiled = graph.compile()?;
    log::info!("compiled order: {}", compiled.task_names().join(" -> "));

    for cycle in 1..=args.frames {
        if args.out_of_date_at == Some(cycle) {
            surface.script_acquire(Err(BackendError::OutOfDate));
        }

        match compiled.execute() {
            Ok(()) => log::info!(
                "cycle {cycle}: frame slot {:?} presented image {:?}",
                frame_slot.get(),
                image.get()
            ),
            Err(err) if err.is_recoverable() => {
                log::warn!("cycle {cycle}: {err}; rebuilding surface state");
                surface.recreate();
                image.reset();
            }
            Err(err) => return Err(err.into()),
        }
    }

    for buffer in &command_buffers {
        log::info!(
            "{}: submitted {} times, last commands {:?}",
            buffer.label(),
            buffer.submit_count(),
            buffer.commands()
        );
    }
    log::info!("{} backend calls recorded", backend.events().len());
    Ok(())
}

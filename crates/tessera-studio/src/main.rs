mod config;
mod pipelines;
mod scene;

use std::sync::Arc;

use anyhow::Result;
use tessera_engine::batch::{GeometryBatch, LineBatch, MeshBatch, RedrawRequest, VertexFill};
use tessera_engine::device::{HeadlessGpu, HeadlessInit};
use tessera_engine::logging::init_logging;
use tessera_engine::render::{PassCtx, RenderCtx};

use crate::config::StudioConfig;
use crate::pipelines::{CameraUniform, StudioPipelines};

fn main() -> Result<()> {
    let config = StudioConfig::default();
    init_logging(config.logging.clone());

    let gpu = HeadlessGpu::new_blocking(HeadlessInit::default())?;
    let info = gpu.adapter_info();
    log::info!(
        "studio: {} ({:?}), {}x{} offscreen",
        info.name,
        info.backend,
        config.width,
        config.height
    );

    let studio = StudioPipelines::new(gpu.device(), gpu.color_format());
    studio.write_camera(
        gpu.queue(),
        &CameraUniform::looking_at_field(config.half_extent(), config.aspect()),
    );

    let redraw = RedrawRequest::new();
    let cube = Arc::new(scene::cube());

    let mut meshes: MeshBatch = MeshBatch::meshes(config.mesh_batch.clone());
    meshes.subscribe(redraw.handler());
    meshes.set_geometries(scene::cube_field(&cube, &config, 0.0));

    let mut lines: LineBatch = LineBatch::lines(config.line_batch.clone());
    lines.subscribe(redraw.handler());
    lines.set_geometries(scene::grid(&config));

    for frame in 0..config.frames {
        if frame > 0 {
            // reshape the field; the grid stays committed as is
            let phase = frame as f32 * 0.6;
            meshes.set_geometries(scene::cube_field(&cube, &config, phase));
        }

        if !redraw.take() {
            log::info!("frame {frame}: nothing changed, skipped");
            continue;
        }
        render_frame(&gpu, &studio, &config, &meshes, &lines)?;

        let stats = meshes.stats();
        log::info!(
            "frame {frame}: {} cubes, {} vertices, {} indices, {} fill in {:?}",
            stats.geometry_count,
            stats.vertex_count,
            stats.index_count,
            if stats.parallel { "parallel" } else { "sequential" },
            stats.build_time
        );
    }

    // rendering commits, which raised one more redraw per rebuilt batch
    if redraw.take() {
        log::debug!("studio: final redraw request dropped");
    }

    let bounds = meshes.bounds();
    log::info!(
        "studio: field bounds {:?}..{:?}, grid {} segments",
        bounds.min,
        bounds.max,
        lines.geometries().len()
    );

    meshes.dispose();
    lines.dispose();
    Ok(())
}

fn render_frame(
    gpu: &HeadlessGpu,
    studio: &StudioPipelines,
    config: &StudioConfig,
    meshes: &MeshBatch,
    lines: &LineBatch,
) -> Result<()> {
    let alloc = gpu.render_ctx();
    let mut frame = gpu.begin_frame(config.width, config.height)?;

    {
        let mut rpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tessera studio pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.05,
                        g: 0.06,
                        b: 0.08,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        rpass.set_bind_group(0, &studio.camera_bind_group, &[]);

        let mut ctx = PassCtx::new(&mut rpass, &studio.pipelines);
        draw_batch(lines, &alloc, &mut ctx)?;
        draw_batch(meshes, &alloc, &mut ctx)?;
    }

    let texture = gpu.submit(frame);
    log::debug!("studio: submitted {}x{} frame", texture.width(), texture.height());
    Ok(())
}

/// Binds one batch from slot 0 and issues its single draw call.
fn draw_batch<F: VertexFill>(
    batch: &GeometryBatch<F>,
    alloc: &RenderCtx<'_>,
    ctx: &mut PassCtx<'_, '_>,
) -> Result<()> {
    let mut slot = 0;
    if !batch.attach_buffers(alloc, ctx, &mut slot)? {
        log::trace!("{}: empty, draw skipped", batch.config().label);
        return Ok(());
    }
    if let Some(range) = batch.draw_range() {
        ctx.draw(range);
    }
    Ok(())
}

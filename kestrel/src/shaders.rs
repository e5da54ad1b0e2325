// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The WGSL module shared by every pipeline.

use crate::recording::Pipeline;

pub(crate) const DRAW_SHADER: &str = include_str!("shader/draw.wgsl");

pub(crate) const VERTEX_ENTRY: &str = "vs_main";

/// Fragment entry point of `pipeline`.
pub(crate) fn fragment_entry(pipeline: Pipeline) -> &'static str {
    match pipeline {
        Pipeline::Basic | Pipeline::Overlay => "fs_main",
        Pipeline::Text => "fs_text",
    }
}

#[cfg(test)]
mod tests {
    use super::{DRAW_SHADER, VERTEX_ENTRY, fragment_entry};
    use crate::recording::Pipeline;

    #[test]
    fn entry_points_exist() {
        assert!(DRAW_SHADER.contains(&format!("fn {VERTEX_ENTRY}(")));
        for pipeline in Pipeline::ALL {
            let entry = fragment_entry(pipeline);
            assert!(DRAW_SHADER.contains(&format!("fn {entry}(")), "{entry} missing");
        }
    }
}

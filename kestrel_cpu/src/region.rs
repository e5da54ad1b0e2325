// Copyright 2025 the Kestrel Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Splitting a single mutable pixel buffer into screen regions that can be
//! rasterized concurrently.

#[derive(Debug)]
pub struct Regions<'a> {
    regions: Vec<Region<'a>>,
}

impl<'a> Regions<'a> {
    /// Tiles a `width` × `height` buffer into `count_x` × `count_y` regions.
    ///
    /// Region boundaries are `width * i / count_x` and `height * j / count_y`, so the
    /// regions cover every pixel exactly once. Regions are ordered bottom to top, and
    /// left to right within a band.
    ///
    /// # Panics
    ///
    /// If `buffer` is shorter than `pitch * height` pixels, or a count is zero.
    pub fn new(
        width: u32,
        height: u32,
        pitch: u32,
        count_x: u32,
        count_y: u32,
        mut buffer: &'a mut [u32],
    ) -> Self {
        assert!(count_x > 0 && count_y > 0, "at least one region is needed");
        assert!(
            buffer.len() >= pitch as usize * height as usize,
            "buffer of {} pixels is too small for {height} rows of {pitch} pixels",
            buffer.len()
        );
        let xs = boundaries(width, count_x);
        let ys = boundaries(height, count_y);

        let mut regions = Vec::with_capacity(count_x as usize * count_y as usize);
        for band in ys.windows(2) {
            for columns in xs.windows(2) {
                regions.push(Region {
                    x0: columns[0],
                    x1: columns[1],
                    y0: band[0],
                    y1: band[1],
                    rows: Vec::with_capacity((band[1] - band[0]) as usize),
                });
            }
        }

        let mut band = 0;
        for y in 0..height {
            while y >= ys[band + 1] {
                band += 1;
            }
            let (line, tail) = core::mem::take(&mut buffer).split_at_mut(pitch as usize);
            buffer = tail;

            let mut line = &mut line[..width as usize];
            for (column, bounds) in xs.windows(2).enumerate() {
                let (head, tail) =
                    core::mem::take(&mut line).split_at_mut((bounds[1] - bounds[0]) as usize);
                regions[band * count_x as usize + column].rows.push(head);
                line = tail;
            }
        }

        Self { regions }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Apply the given function to each region.
    pub fn update_regions(&mut self, func: impl FnMut(&mut Region<'_>)) {
        self.regions.iter_mut().for_each(func);
    }

    pub fn into_vec(self) -> Vec<Region<'a>> {
        self.regions
    }
}

fn boundaries(extent: u32, count: u32) -> Vec<u32> {
    (0..=count)
        .map(|i| (u64::from(extent) * u64::from(i) / u64::from(count)) as u32)
        .collect()
}

/// A rectangle of pixels `x0..x1` × `y0..y1`, borrowed row by row from the target.
#[derive(Debug)]
pub struct Region<'a> {
    pub(crate) x0: u32,
    pub(crate) x1: u32,
    pub(crate) y0: u32,
    pub(crate) y1: u32,
    rows: Vec<&'a mut [u32]>,
}

impl Region<'_> {
    pub fn x0(&self) -> u32 {
        self.x0
    }

    pub fn x1(&self) -> u32 {
        self.x1
    }

    pub fn y0(&self) -> u32 {
        self.y0
    }

    pub fn y1(&self) -> u32 {
        self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.x0 == self.x1 || self.y0 == self.y1
    }

    /// The pixels of row `y` (absolute), starting at column `x0`.
    pub(crate) fn row_mut(&mut self, y: u32) -> &mut [u32] {
        self.rows[(y - self.y0) as usize]
    }

    pub(crate) fn fill(&mut self, pixel: u32) {
        for row in &mut self.rows {
            row.fill(pixel);
        }
    }
}

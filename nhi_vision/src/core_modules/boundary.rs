// THEORY:
// Turns a set of grid cells into its exact polygon outline.
//
// 1.  **Edge collection**: every cell side that faces a non-member becomes a
//     directed unit edge, oriented so the member cell is on its right (in grid
//     space, Y down). Outer rings therefore run clockwise and holes anticlockwise.
// 2.  **Chaining**: at each corner the next edge is the one that turns right
//     soonest. Where two members touch only diagonally the corner has two
//     outgoing edges, and the right-turn rule closes each side separately, so
//     corner contacts become separate polygon parts rather than a
//     self-touching ring.
// 3.  **Assembly**: rings with positive shoelace area are exteriors. Each hole
//     is attached to the smallest exterior containing a sample point taken in the
//     empty cell just outside the hole's first edge.
//
// Collinear runs are merged, so a 10x10 square yields a 4-corner ring.

use crate::core_modules::geo_transform::GeoTransform;
use crate::core_modules::grid::Cell;
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use std::collections::HashMap;

type Vertex = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    East,
    South,
    West,
    North,
}

impl Dir {
    fn ordinal(self) -> u8 {
        match self {
            Dir::East => 0,
            Dir::South => 1,
            Dir::West => 2,
            Dir::North => 3,
        }
    }

    /// 0 = right turn, 1 = straight, 2 = left turn, 3 = reversal.
    fn turn_rank(self, next: Dir) -> u8 {
        match (next.ordinal() + 4 - self.ordinal()) % 4 {
            1 => 0,
            0 => 1,
            3 => 2,
            _ => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    to: Vertex,
    dir: Dir,
    /// Center of the non-member cell on the far side of this edge.
    outside: (f64, f64),
}

/// Membership bitmap over the cells' bounding box.
struct LocalMask {
    min_x: usize,
    min_y: usize,
    width: usize,
    height: usize,
    bits: Vec<bool>,
}

impl LocalMask {
    fn new(cells: &[Cell]) -> Self {
        let min_x = cells.iter().map(|c| c.x).min().unwrap_or(0);
        let min_y = cells.iter().map(|c| c.y).min().unwrap_or(0);
        let max_x = cells.iter().map(|c| c.x).max().unwrap_or(0);
        let max_y = cells.iter().map(|c| c.y).max().unwrap_or(0);
        let width = max_x - min_x + 1;
        let height = max_y - min_y + 1;
        let mut bits = vec![false; width * height];
        for c in cells {
            bits[(c.y - min_y) * width + (c.x - min_x)] = true;
        }
        Self {
            min_x,
            min_y,
            width,
            height,
            bits,
        }
    }

    fn contains(&self, x: isize, y: isize) -> bool {
        let lx = x - self.min_x as isize;
        let ly = y - self.min_y as isize;
        if lx < 0 || ly < 0 || lx as usize >= self.width || ly as usize >= self.height {
            return false;
        }
        self.bits[ly as usize * self.width + lx as usize]
    }
}

/// Traces the outline of `cells` and maps it through `transform`.
pub fn trace_outline(cells: &[Cell], transform: &GeoTransform) -> MultiPolygon<f64> {
    if cells.is_empty() {
        return MultiPolygon::new(Vec::new());
    }
    let mask = LocalMask::new(cells);
    let edges = collect_edges(cells, &mask);
    let rings = chain_rings(&edges);
    assemble(rings, transform)
}

fn collect_edges(cells: &[Cell], mask: &LocalMask) -> Vec<Edge> {
    let mut edges = Vec::new();
    for c in cells {
        let (x, y) = (c.x, c.y);
        let (xi, yi) = (x as isize, y as isize);
        let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
        if !mask.contains(xi, yi - 1) {
            edges.push(Edge {
                from: (x, y),
                to: (x + 1, y),
                dir: Dir::East,
                outside: (cx, cy - 1.0),
            });
        }
        if !mask.contains(xi + 1, yi) {
            edges.push(Edge {
                from: (x + 1, y),
                to: (x + 1, y + 1),
                dir: Dir::South,
                outside: (cx + 1.0, cy),
            });
        }
        if !mask.contains(xi, yi + 1) {
            edges.push(Edge {
                from: (x + 1, y + 1),
                to: (x, y + 1),
                dir: Dir::West,
                outside: (cx, cy + 1.0),
            });
        }
        if !mask.contains(xi - 1, yi) {
            edges.push(Edge {
                from: (x, y + 1),
                to: (x, y),
                dir: Dir::North,
                outside: (cx - 1.0, cy),
            });
        }
    }
    edges
}

/// A closed ring of corner vertices (without the repeated closing vertex) and
/// the sample point outside its first edge.
struct Ring {
    vertices: Vec<Vertex>,
    sample_point: (f64, f64),
}

fn chain_rings(edges: &[Edge]) -> Vec<Ring> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.from).or_default().push(i);
    }

    let successor = |i: usize| -> usize {
        let current = &edges[i];
        outgoing
            .get(&current.to)
            .and_then(|candidates| {
                candidates
                    .iter()
                    .copied()
                    .min_by_key(|&j| current.dir.turn_rank(edges[j].dir))
            })
            .unwrap_or(i)
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut members = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            members.push(current);
            current = successor(current);
            if current == start || used[current] {
                break;
            }
        }

        let n = members.len();
        let vertices: Vec<Vertex> = (0..n)
            .filter(|&k| edges[members[k]].dir != edges[members[(k + n - 1) % n]].dir)
            .map(|k| edges[members[k]].from)
            .collect();
        rings.push(Ring {
            vertices,
            sample_point: edges[start].outside,
        });
    }
    rings
}

/// Twice the signed shoelace area in grid space. Positive for exteriors.
fn signed_area2(vertices: &[Vertex]) -> f64 {
    let n = vertices.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = vertices[i];
            let (x1, y1) = vertices[(i + 1) % n];
            x0 as f64 * y1 as f64 - x1 as f64 * y0 as f64
        })
        .sum()
}

fn ring_contains(vertices: &[Vertex], point: (f64, f64)) -> bool {
    let (px, py) = point;
    let n = vertices.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (vertices[i].0 as f64, vertices[i].1 as f64);
        let (xj, yj) = (vertices[j].0 as f64, vertices[j].1 as f64);
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn to_line_string(vertices: &[Vertex], transform: &GeoTransform) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = vertices
        .iter()
        .map(|&(x, y)| {
            let (mx, my) = transform.corner_to_map(x, y);
            Coord { x: mx, y: my }
        })
        .collect();
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    LineString::new(coords)
}

fn assemble(rings: Vec<Ring>, transform: &GeoTransform) -> MultiPolygon<f64> {
    let mut exteriors: Vec<(Ring, f64, Vec<Ring>)> = Vec::new();
    let mut holes: Vec<Ring> = Vec::new();
    for ring in rings {
        let area2 = signed_area2(&ring.vertices);
        if area2 > 0.0 {
            exteriors.push((ring, area2, Vec::new()));
        } else {
            holes.push(ring);
        }
    }

    for hole in holes {
        let parent = exteriors
            .iter_mut()
            .filter(|(outer, _, _)| ring_contains(&outer.vertices, hole.sample_point))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((_, _, interiors)) = parent {
            interiors.push(hole);
        }
    }

    let polygons = exteriors
        .into_iter()
        .map(|(outer, _, interiors)| {
            Polygon::new(
                to_line_string(&outer.vertices, transform),
                interiors
                    .iter()
                    .map(|h| to_line_string(&h.vertices, transform))
                    .collect(),
            )
        })
        .collect();
    MultiPolygon::new(polygons)
}

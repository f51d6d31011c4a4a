//! Minimal Gmsh `.msh` (ASCII) import/export for tetrahedral meshes.
//!
//! Only the `$Nodes`/`$EndNodes` and `$Elements`/`$EndElements` blocks are
//! interpreted; any other section is skipped. Element records are read by
//! their trailing four integer fields, which are 1-based in the file and
//! stored 0-based.

use na::Point3;
use thiserror::Error;

/// A tetrahedral mesh read from (or written to) a `.msh` file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MshMesh {
    /// Node positions, 0-based.
    pub nodes: Vec<Point3<f64>>,
    /// Tetrahedra as 0-based node-id 4-tuples.
    pub tets: Vec<[u32; 4]>,
}

/// Errors produced by [`parse_msh`].
#[derive(Debug, Error)]
pub enum MshError {
    /// A `$Nodes` or `$Elements` block never ended.
    #[error("unterminated section {0}")]
    UnterminatedSection(&'static str),
    /// The file contains no `$Nodes` block.
    #[error("missing $Nodes section")]
    MissingNodes,
    /// A record did not have the expected number of fields.
    #[error("malformed record at line {0}")]
    MalformedRecord(usize),
    /// A numeric field failed to parse.
    #[error("invalid number at line {0}")]
    InvalidNumber(usize),
    /// An element referenced a node id outside the node block.
    #[error("node id {0} out of range at line {1}")]
    NodeIdOutOfRange(u64, usize),
}

/// Parses an ASCII `.msh` document.
pub fn parse_msh(text: &str) -> Result<MshMesh, MshError> {
    let mut mesh = MshMesh::default();
    let mut lines = text.lines().enumerate();
    let mut saw_nodes = false;

    while let Some((_, line)) = lines.next() {
        match line.trim() {
            "$Nodes" => {
                saw_nodes = true;
                parse_section(&mut lines, "$EndNodes", |no, tokens| {
                    // node-number x y z
                    if tokens.len() < 4 {
                        return Err(MshError::MalformedRecord(no));
                    }
                    let coords: Result<Vec<f64>, _> = tokens[tokens.len() - 3..]
                        .iter()
                        .map(|t| t.parse::<f64>())
                        .collect();
                    let coords = coords.map_err(|_| MshError::InvalidNumber(no))?;
                    mesh.nodes.push(Point3::new(coords[0], coords[1], coords[2]));
                    Ok(())
                })?;
            }
            "$Elements" => {
                let num_nodes = mesh.nodes.len() as u64;
                parse_section(&mut lines, "$EndElements", |no, tokens| {
                    // elm-number [type tags...] n1 n2 n3 n4
                    if tokens.len() < 5 {
                        return Err(MshError::MalformedRecord(no));
                    }
                    let mut ids = [0u32; 4];
                    for (slot, token) in tokens[tokens.len() - 4..].iter().enumerate() {
                        let one_based: u64 =
                            token.parse().map_err(|_| MshError::InvalidNumber(no))?;
                        if one_based == 0 || one_based > num_nodes {
                            return Err(MshError::NodeIdOutOfRange(one_based, no));
                        }
                        ids[slot] = (one_based - 1) as u32;
                    }
                    mesh.tets.push(ids);
                    Ok(())
                })?;
            }
            _ => {}
        }
    }

    if !saw_nodes {
        return Err(MshError::MissingNodes);
    }
    Ok(mesh)
}

/// Runs `record` over the data lines of a section. The first non-empty line
/// (the record count) is consumed and ignored; the actual records decide.
fn parse_section<'a, I: Iterator<Item = (usize, &'a str)>>(
    lines: &mut I,
    end_tag: &'static str,
    mut record: impl FnMut(usize, &[&str]) -> Result<(), MshError>,
) -> Result<(), MshError> {
    let mut saw_count = false;
    for (no, line) in lines.by_ref() {
        let line = line.trim();
        if line == end_tag {
            return Ok(());
        }
        if line.is_empty() {
            continue;
        }
        if !saw_count {
            saw_count = true;
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        record(no + 1, &tokens)?;
    }
    Err(MshError::UnterminatedSection(end_tag))
}

/// Serializes a mesh as an ASCII `.msh` (format 2.2) document.
pub fn serialize_msh(mesh: &MshMesh) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    out.push_str("$MeshFormat\n2.2 0 8\n$EndMeshFormat\n");

    out.push_str("$Nodes\n");
    let _ = writeln!(out, "{}", mesh.nodes.len());
    for (i, n) in mesh.nodes.iter().enumerate() {
        let _ = writeln!(out, "{} {} {} {}", i + 1, n.x, n.y, n.z);
    }
    out.push_str("$EndNodes\n");

    out.push_str("$Elements\n");
    let _ = writeln!(out, "{}", mesh.tets.len());
    for (i, t) in mesh.tets.iter().enumerate() {
        // elm-number elm-type(4 = tetrahedron) number-of-tags node ids
        let _ = writeln!(
            out,
            "{} 4 0 {} {} {} {}",
            i + 1,
            t[0] + 1,
            t[1] + 1,
            t[2] + 1,
            t[3] + 1
        );
    }
    out.push_str("$EndElements\n");
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_mesh() -> MshMesh {
        MshMesh {
            nodes: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(1.0, 1.0, 1.0),
            ],
            tets: vec![[0, 1, 2, 3], [1, 2, 3, 4]],
        }
    }

    #[test]
    fn roundtrip() {
        let mesh = sample_mesh();
        let text = serialize_msh(&mesh);
        let parsed = parse_msh(&text).unwrap();
        assert_eq!(parsed, mesh);
    }

    #[test]
    fn indices_are_rebased() {
        let text = "\
$Nodes
2
1 0 0 0
2 1 2 3
$EndNodes
$Elements
1
1 4 0 1 2 1 2
$EndElements
";
        let parsed = parse_msh(text).unwrap();
        assert_eq!(parsed.nodes.len(), 2);
        assert_eq!(parsed.tets, vec![[0, 1, 0, 1]]);
    }

    #[test]
    fn unknown_sections_are_skipped() {
        let text = "\
$MeshFormat
2.2 0 8
$EndMeshFormat
$PhysicalNames
1
3 1 \"body\"
$EndPhysicalNames
$Nodes
1
1 0.5 0.5 0.5
$EndNodes
";
        let parsed = parse_msh(text).unwrap();
        assert_eq!(parsed.nodes.len(), 1);
        assert!(parsed.tets.is_empty());
    }

    #[test]
    fn missing_nodes_is_an_error() {
        assert!(matches!(parse_msh("$Elements\n0\n$EndElements\n"), Err(MshError::MissingNodes)));
    }

    #[test]
    fn unterminated_section_is_an_error() {
        let text = "$Nodes\n1\n1 0 0 0\n";
        assert!(matches!(
            parse_msh(text),
            Err(MshError::UnterminatedSection("$EndNodes"))
        ));
    }

    #[test]
    fn out_of_range_node_id_is_an_error() {
        let text = "\
$Nodes
1
1 0 0 0
$EndNodes
$Elements
1
1 4 0 1 1 1 9
$EndElements
";
        assert!(matches!(
            parse_msh(text),
            Err(MshError::NodeIdOutOfRange(9, _))
        ));
    }
}

use r2plus1d_model::{BlockSummary, R3dNetwork};
use r2plus1d_symbol::Graph;
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::Path;

/// Description of an assembled network written next to its graph.
#[derive(Serialize)]
pub struct NetworkManifest<'a> {
    pub model: String,
    pub output: &'a str,
    pub blocks: &'a [BlockSummary],
    pub graph: &'a Graph,
}

impl<'a> NetworkManifest<'a> {
    pub fn new(network: &'a R3dNetwork) -> Result<Self, Box<dyn Error>> {
        let output = network.graph.get(network.output)?;
        Ok(NetworkManifest {
            model: network.depth.to_string(),
            output: &output.name,
            blocks: &network.blocks,
            graph: &network.graph,
        })
    }
}

/// Save a graph to a JSON file.
pub fn save_graph(graph: &Graph, path: &str) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(graph)?;
    fs::write(Path::new(path), json)?;
    Ok(())
}

/// Load a graph from a JSON file. Names and input references are re-checked.
pub fn load_graph(path: &str) -> Result<Graph, Box<dyn Error>> {
    let json = fs::read_to_string(Path::new(path))?;
    let graph: Graph = serde_json::from_str(&json)?;
    Ok(graph)
}

/// Save the graph together with its block summary.
pub fn save_network(network: &R3dNetwork, path: &str) -> Result<(), Box<dyn Error>> {
    let manifest = NetworkManifest::new(network)?;
    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(Path::new(path), json)?;
    Ok(())
}

/// Write a Graphviz rendering of the graph.
pub fn save_dot(graph: &Graph, path: &str) -> Result<(), Box<dyn Error>> {
    fs::write(Path::new(path), graph.to_dot())?;
    Ok(())
}

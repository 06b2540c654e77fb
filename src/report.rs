//! Console report for cost responses

use std::io::{self, Write};

use costquery_api::{Allocation, AllocationData, CostResponse};

const MIB: f64 = 1024.0 * 1024.0;

/// Write a human readable report of `response` to `out`
pub fn write_report<W: Write>(out: &mut W, response: &CostResponse) -> io::Result<()> {
    let data = match &response.data {
        Some(data) if !data.is_empty() => data,
        _ => {
            writeln!(out, "No matching resources found")?;
            return Ok(());
        }
    };

    match data {
        AllocationData::Windows(sets) => {
            for (i, set) in sets.iter().enumerate() {
                writeln!(out)?;
                writeln!(out, "Time Range {}:", i + 1)?;
                for (name, allocation) in set {
                    write_allocation(out, name, allocation)?;
                }
            }
            writeln!(out)?;
            writeln!(out, "Total: {} resource allocations", data.allocation_count())?;
        }
        AllocationData::Single(set) => {
            writeln!(out, "Found {} resource allocations", set.len())?;
            for (name, allocation) in set {
                write_allocation(out, name, allocation)?;
            }
            writeln!(out)?;
        }
    }

    writeln!(out, "Total Cost: {:.6}", data.total_cost())
}

fn write_allocation<W: Write>(out: &mut W, key: &str, a: &Allocation) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "  Pod: {}", key)?;

    if let Some(name) = non_empty(&a.name) {
        writeln!(out, "    Name: {}", name)?;
    }
    if let Some(start) = non_empty(&a.start) {
        writeln!(out, "    Start: {}", start)?;
    }
    if let Some(end) = non_empty(&a.end) {
        writeln!(out, "    End: {}", end)?;
    }

    if let Some(v) = non_zero(a.cpu_core_request_average) {
        writeln!(out, "    CPU Request Average: {:.2} cores", v)?;
    }
    if let Some(v) = non_zero(a.cpu_core_usage_average) {
        writeln!(out, "    CPU Usage Average: {:.2} cores", v)?;
    }
    if let Some(v) = non_zero(a.ram_byte_request_average) {
        writeln!(out, "    RAM Request Average: {:.2} MB", v / MIB)?;
    }
    if let Some(v) = non_zero(a.ram_byte_usage_average) {
        writeln!(out, "    RAM Usage Average: {:.2} MB", v / MIB)?;
    }

    if let Some(v) = non_zero(a.cost) {
        writeln!(out, "    Cost: {:.4}", v)?;
    }
    if let Some(v) = non_zero(a.cost_ratio) {
        writeln!(out, "    Cost Ratio: {:.2}%", v * 100.0)?;
    }
    if let Some(v) = non_zero(a.custom_cost) {
        writeln!(out, "    Custom Cost: {:.4}", v)?;
    }

    if let Some(props) = &a.properties {
        writeln!(out, "    Properties:")?;
        let fields = [
            ("Namespace", &props.namespace),
            ("Node", &props.node),
            ("Controller", &props.controller),
            ("Controller Kind", &props.controller_kind),
            ("Cluster", &props.cluster),
        ];
        for (label, value) in fields {
            if let Some(value) = non_empty(value) {
                writeln!(out, "      {}: {}", label, value)?;
            }
        }
    }

    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn non_zero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

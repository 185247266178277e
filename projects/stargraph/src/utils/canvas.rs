use chrono::NaiveTime;
use serde::Serialize;
use thiserror::Error;

use super::timeline::DataPoint;

#[derive(Debug, Error)]
pub enum CanvasScriptError {
    #[error("SerializeDataPoints: {source}")]
    SerializeDataPoints {
        #[from]
        source: serde_json::Error,
    },
}

/// CanvasJS point: `x` in epoch milliseconds, `y` the running total.
#[derive(Serialize)]
struct CanvasPoint {
    x: i64,
    y: u64,
}

#[derive(Serialize)]
struct ChartOptions<'a> {
    title: Title<'a>,
    #[serde(rename = "axisX")]
    axis_x: Axis<'a>,
    #[serde(rename = "axisY")]
    axis_y: Axis<'a>,
    data: [Series; 1],
}

#[derive(Serialize)]
struct Title<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Axis<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct Series {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "xValueType")]
    x_value_type: &'static str,
    #[serde(rename = "dataPoints")]
    data_points: Vec<CanvasPoint>,
}

/// Builds the browser script that draws the star curve into the
/// `chartContainer` element with CanvasJS.
pub fn write_canvas_script(
    points: &[DataPoint],
    owner: &str,
    name: &str,
) -> Result<String, CanvasScriptError> {
    let title = format!("{owner}/{name}");
    let options = ChartOptions {
        title: Title { text: &title },
        axis_x: Axis { title: "Date" },
        axis_y: Axis {
            title: "Total Stars",
        },
        data: [Series {
            kind: "line",
            x_value_type: "dateTime",
            data_points: points
                .iter()
                .map(|point| CanvasPoint {
                    x: point
                        .date
                        .and_time(NaiveTime::MIN)
                        .and_utc()
                        .timestamp_millis(),
                    y: point.total,
                })
                .collect(),
        }],
    };

    // serde_json escapes quotes, but `</script>` inside a repo name would
    // still end an inline script block.
    let options = serde_json::to_string(&options)?.replace("</", "<\\/");

    Ok(format!(
        "window.addEventListener(\"load\", function () {{\n\
         \tvar chart = new CanvasJS.Chart(\"chartContainer\", {options});\n\
         \tchart.render();\n\
         }});\n"
    ))
}

use plotters::prelude::*;
use thiserror::Error;

use super::timeline::DataPoint;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 400;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Draw: {message}")]
    Draw { message: String },
}

fn draw_error(err: impl std::fmt::Display) -> ChartError {
    ChartError::Draw {
        message: err.to_string(),
    }
}

/// Renders the cumulative star curve as a standalone SVG document.
pub fn generate_star_chart(
    points: &[DataPoint],
    owner: &str,
    name: &str,
) -> Result<String, ChartError> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Ok(generate_empty_chart(owner, name));
    };

    let max_stars = points.iter().map(|point| point.total).max().unwrap_or(0);
    let y_max = if max_stars == 0 { 10 } else { max_stars + (max_stars / 10).max(1) };
    // A single day still needs a non-empty x range.
    let x_end = if last.date > first.date {
        last.date
    } else {
        first.date.succ_opt().unwrap_or(first.date)
    };

    let mut buffer = String::new();
    {
        let root = SVGBackend::with_string(&mut buffer, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_error)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{owner}/{name} - Stars over time"), ("sans-serif", 24).into_font())
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(first.date..x_end, 0_u64..y_max)
            .map_err(draw_error)?;

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Total Stars")
            .x_label_formatter(&|date| date.format("%Y-%m-%d").to_string())
            .draw()
            .map_err(draw_error)?;

        chart
            .draw_series(LineSeries::new(
                points.iter().map(|point| (point.date, point.total)),
                BLUE.stroke_width(2),
            ))
            .map_err(draw_error)?
            .label("Total Stars")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], BLUE));

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(draw_error)?;

        root.present().map_err(draw_error)?;
    }

    Ok(buffer)
}

fn generate_empty_chart(owner: &str, name: &str) -> String {
    format!(
        "<svg width=\"{WIDTH}\" height=\"{HEIGHT}\" xmlns=\"http://www.w3.org/2000/svg\">\
            <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\
            <text x=\"{x}\" y=\"{y}\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"18\" fill=\"#666666\">\
                No star data available for {owner}/{name}\
            </text>\
        </svg>",
        x = WIDTH / 2,
        y = HEIGHT / 2,
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn empty_series_renders_placeholder() {
        let svg = generate_star_chart(&[], "octo", "repo").expect("placeholder renders");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("No star data available for octo/repo"));
    }

    #[test]
    fn series_renders_svg_document() {
        let date = NaiveDate::from_ymd_opt(2021, 6, 1).expect("valid date");
        let points = [
            DataPoint { date, total: 3 },
            DataPoint {
                date: date.succ_opt().expect("valid date"),
                total: 7,
            },
        ];

        let svg = generate_star_chart(&points, "octo", "repo").expect("chart renders");

        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }
}

#![allow(dead_code)]

use std::{collections::HashMap, path::Path};

use districtbuilder::{AttrValue, Config, Feature, RepairError};
use geo::{polygon, Geometry, Point};

/// Two bodies, an aliased subject and three nested geolevels.
pub const CONFIG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DistrictBuilder>
  <LegislativeBodies>
    <LegislativeBody id="congress" name="Congressional" member="District %s" maxdistricts="3"/>
    <LegislativeBody id="house" name="State House" member="House %s" maxdistricts="9"/>
  </LegislativeBodies>
  <Subjects>
    <Subject id="totpop" name="Total Population" short_name="Pop." displayed="true" sortkey="1" field="POP"/>
    <Subject id="pop20" aliasfor="totpop" field="POP20"/>
    <Subject id="vap" name="Voting Age Population" short_name="VAP" displayed="true" sortkey="2" field="VAP"/>
  </Subjects>
  <Targets>
    <Target id="congress_pop" subjectref="pop20" value="1000" range1="950" range2="1050"/>
    <Target id="house_vap" subjectref="vap" value="300"/>
  </Targets>
  <GeoLevels>
    <GeoLevel id="county" name="county" min_zoom="0" sort_key="1" shapefile="county.shp" namefield="NAME">
      <LegislativeBodies>
        <LegislativeBody ref="congress">
          <LegislativeTargets><LegislativeTarget ref="congress_pop" default="true"/></LegislativeTargets>
        </LegislativeBody>
        <LegislativeBody ref="house">
          <LegislativeTargets><LegislativeTarget ref="house_vap" default="true"/></LegislativeTargets>
        </LegislativeBody>
      </LegislativeBodies>
    </GeoLevel>
    <GeoLevel id="tract" name="tract" min_zoom="4" sort_key="2" shapefile="tract.shp" namefield="NAME" supplementfield="GEOID">
      <LegislativeBodies>
        <LegislativeBody ref="congress">
          <Parent ref="county"/>
          <LegislativeTargets><LegislativeTarget ref="congress_pop"/></LegislativeTargets>
        </LegislativeBody>
      </LegislativeBodies>
    </GeoLevel>
    <GeoLevel id="block" name="block" min_zoom="8" sort_key="3">
      <LegislativeBodies>
        <LegislativeBody ref="congress">
          <Parent ref="tract"/>
          <LegislativeTargets><LegislativeTarget ref="congress_pop"/></LegislativeTargets>
        </LegislativeBody>
      </LegislativeBodies>
    </GeoLevel>
  </GeoLevels>
</DistrictBuilder>"#;

pub fn config() -> Config {
    Config::parse_str(CONFIG, Path::new(".")).unwrap()
}

pub fn unit_square(x: f64, y: f64) -> Geometry<f64> {
    Geometry::Polygon(polygon![(x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0), (x: x, y: y)])
}

pub fn feature(index: usize, geometry: Result<Geometry<f64>, RepairError>, attributes: &[(&str, AttrValue)]) -> Feature {
    Feature {
        index,
        geometry,
        attributes: attributes.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>(),
    }
}

/// A unit-square county feature with a name and population values.
pub fn county(index: usize, pop: f64) -> Feature {
    feature(index, Ok(unit_square(index as f64 * 2.0, 0.0)), &[
        ("NAME", AttrValue::Text(format!("County {index}"))),
        ("POP20", AttrValue::Number(pop)),
        ("VAP", AttrValue::Integer(pop as i64 / 2)),
    ])
}

/// A feature whose geometry is a bare point.
pub fn point_county(index: usize) -> Feature {
    feature(index, Ok(Geometry::Point(Point::new(0.5, 0.5))), &[
        ("NAME", AttrValue::Text(format!("County {index}"))),
        ("POP20", AttrValue::Number(1.0)),
        ("VAP", AttrValue::Integer(1)),
    ])
}

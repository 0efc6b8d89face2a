mod beacons;
mod locations;
